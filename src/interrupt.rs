//! Ctrl+C capture
//!
//! The monitor loop is synchronous, so the signal is awaited on a helper
//! thread running a single-threaded tokio runtime. The loop sees it through
//! the shared flag on its next iteration.

use crate::error::{MonitorError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Raise `flag` on the first Ctrl+C
pub fn install(flag: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(MonitorError::SignalHandler)?;

    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::debug!("Ctrl+C received");
                        flag.store(true, Ordering::SeqCst);
                    }
                    Err(e) => log::warn!("Ctrl+C listener failed: {}", e),
                }
            });
        })
        .map_err(MonitorError::SignalHandler)?;

    Ok(())
}
