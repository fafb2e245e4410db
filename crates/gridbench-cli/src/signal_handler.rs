//! Ctrl+C handling for benchmark runs
//!
//! The first SIGINT or SIGTERM cancels the run's token so the coordinator can
//! stop admitting tasks and write its final log. A second signal exits
//! immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status for a run stopped by a signal
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Signal handler that cancels a run
pub struct SignalHandler {
    token: CancellationToken,
    /// Flag to track if signal handling is active
    is_active: Arc<AtomicBool>,
    received: Arc<AtomicUsize>,
    task_handle: Option<JoinHandle<()>>,
    signals_handle: Option<Handle>,
}

impl SignalHandler {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            is_active: Arc::new(AtomicBool::new(false)),
            received: Arc::new(AtomicUsize::new(0)),
            task_handle: None,
            signals_handle: None,
        }
    }

    /// Start listening for signals
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.is_active.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        self.signals_handle = Some(signals.handle());
        self.is_active.store(true, Ordering::Relaxed);

        let is_active = self.is_active.clone();
        let received = self.received.clone();
        let token = self.token.clone();

        let handle = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                if !is_active.load(Ordering::Relaxed) {
                    continue;
                }
                let count = received.fetch_add(1, Ordering::SeqCst) + 1;
                if count > 1 {
                    eprintln!("\nSecond interrupt, exiting without waiting");
                    std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
                }
                tracing::warn!(signal, "Interrupt received, finishing up");
                eprintln!("\nInterrupting run... saving results (Ctrl+C again to force quit)");
                token.cancel();
            }
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop listening
    pub fn stop(&mut self) {
        self.is_active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.signals_handle.take() {
            handle.close();
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }

    /// Whether the run was asked to stop
    pub fn interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_handler_start_stop() {
        let mut handler = SignalHandler::new(CancellationToken::new());
        assert!(!handler.is_active());

        handler.start().unwrap();
        assert!(handler.is_active());
        assert!(!handler.interrupted());

        handler.stop();
        assert!(!handler.is_active());
    }

    #[tokio::test]
    async fn test_cancelled_token_reads_as_interrupted() {
        let token = CancellationToken::new();
        let handler = SignalHandler::new(token.clone());
        token.cancel();
        assert!(handler.interrupted());
    }
}
