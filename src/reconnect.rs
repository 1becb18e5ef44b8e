// ABOUTME: Supervises a single ESME session, reconnecting after the configured delay
// ABOUTME: stop_trying() ends the loop and unbinds the live session for shutdown

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::session::{EsmeSession, SessionEnd};

/// Control handle for a running [`ReconnectingFactory`] loop.
pub struct FactoryHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FactoryHandle {
    /// Signal shutdown: the live session unbinds and closes, and no further
    /// reconnect attempts are made.
    pub fn stop_trying(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the supervision loop to finish.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Runs sessions back to back. Every exit short of `stop_trying()` leads to
/// a new connect attempt after `reconnect_delay`; the delay is fixed, not
/// exponential, because some SMSCs refuse rapid rebinds outright.
pub struct ReconnectingFactory;

impl ReconnectingFactory {
    pub fn spawn(session: EsmeSession, reconnect_delay: Duration) -> FactoryHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                match session.run(&mut stop_rx).await {
                    Ok(SessionEnd::Stopped) => break,
                    Ok(end) => info!(end = ?end, "session ended"),
                    Err(e) => warn!(error = %e, "session failed"),
                }

                if *stop_rx.borrow() {
                    break;
                }

                debug!(delay = ?reconnect_delay, "reconnecting after delay");
                tokio::select! {
                    _ = time::sleep(reconnect_delay) => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("reconnecting factory stopped");
        });

        FactoryHandle { stop_tx, task }
    }
}
