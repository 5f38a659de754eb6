use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::FutureExt;
use tokio::{
    signal::unix::{Signal, SignalKind},
    sync::watch,
};
use tracing::{debug, info};

/// A `ShutdownSignal` is an helper struct that listens for various shutdown signals sources.
pub struct ShutdownSignal {
    /// A future that resolves when a SIGINT signal is received.
    ctrl_c: Pin<Box<dyn Future<Output = io::Result<()>> + Send>>,
    /// A future that resolves when a SIGTERM signal is received.
    term_signal: Signal,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl ShutdownSignal {
    /// Creates a new `ShutdownSignal` instance. Fails if the SIGTERM handler cannot be
    /// installed.
    pub fn new() -> io::Result<Self> {
        let ctrl_c = Box::pin(tokio::signal::ctrl_c());
        let term_signal = tokio::signal::unix::signal(SignalKind::terminate())?;

        Ok(Self { ctrl_c, term_signal })
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.ctrl_c.poll_unpin(cx).is_ready() {
            debug!("Received SIGINT signal");
            return Poll::Ready(());
        }

        if this.term_signal.poll_recv(cx).is_ready() {
            debug!("Received SIGTERM signal");
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

/// Cooperative stop flag. Loops check the receiver between units of work.
pub fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Set the stop flag once `signal` fires.
pub async fn stop_on_signal<S>(signal: S, stop: watch::Sender<bool>)
where
    S: Future<Output = ()>,
{
    signal.await;
    info!("Shutdown requested, letting in-flight work finish");
    stop.send_replace(true);
}

/// Resolves once the stop flag is set or every sender is gone.
pub async fn stopped(mut stop: watch::Receiver<bool>) {
    // An error means the sender was dropped, which also ends the wait.
    let _ = stop.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn stopped_resolves_after_signal() {
        let (tx, rx) = stop_channel();
        let waiter = tokio::spawn(stopped(rx));

        stop_on_signal(async {}, tx).await;

        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stopped_resolves_when_sender_is_dropped() {
        let (tx, rx) = stop_channel();
        drop(tx);
        timeout(Duration::from_secs(1), stopped(rx)).await.unwrap();
    }

    #[tokio::test]
    async fn stopped_waits_while_flag_is_clear() {
        let (_tx, rx) = stop_channel();
        assert!(timeout(Duration::from_millis(20), stopped(rx)).await.is_err());
    }
}
