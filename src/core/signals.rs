//! Shutdown coordination and OS signal installation.

use crate::error::{FrameError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Why shutdown was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// [`Shutdown::trigger`] was called by the process itself.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Quit => "quit",
            Self::Requested => "requested",
        };
        f.write_str(name)
    }
}

/// Coordinator for graceful shutdown.
///
/// Cloneable; every clone observes the same trigger. The first trigger wins and
/// later ones are ignored. A trigger that fires before anybody waits is not lost.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    /// Create a new, untriggered coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown. Returns `false` if it was already triggered.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// Request shutdown from inside the process.
    pub fn request(&self) -> bool {
        self.trigger(ShutdownReason::Requested)
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The trigger reason, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Wait until shutdown is triggered.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Route SIGINT, SIGTERM and SIGQUIT (Ctrl+C elsewhere) into `shutdown`.
///
/// Handlers are registered before this returns; the returned task forwards the
/// first received signal.
///
/// # Errors
///
/// Returns [`FrameError::SignalHandlerSetup`] if called outside a Tokio runtime or
/// a handler cannot be registered.
#[cfg(unix)]
pub fn install_signal_handlers(shutdown: &Shutdown) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = Handle::try_current()
        .map_err(|e| FrameError::SignalHandlerSetup(std::io::Error::other(e)))?;
    let _entered = runtime.enter();

    let mut interrupt = signal(SignalKind::interrupt()).map_err(FrameError::SignalHandlerSetup)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(FrameError::SignalHandlerSetup)?;
    let mut quit = signal(SignalKind::quit()).map_err(FrameError::SignalHandlerSetup)?;

    let shutdown = shutdown.clone();
    Ok(runtime.spawn(async move {
        let reason = tokio::select! {
            _ = interrupt.recv() => ShutdownReason::Interrupt,
            _ = terminate.recv() => ShutdownReason::Terminate,
            _ = quit.recv() => ShutdownReason::Quit,
            _ = shutdown.wait() => return,
        };
        info!(%reason, "received termination signal");
        shutdown.trigger(reason);
    }))
}

/// Route Ctrl+C into `shutdown`.
///
/// # Errors
///
/// Returns [`FrameError::SignalHandlerSetup`] if called outside a Tokio runtime.
#[cfg(not(unix))]
pub fn install_signal_handlers(shutdown: &Shutdown) -> Result<JoinHandle<()>> {
    let runtime = Handle::try_current()
        .map_err(|e| FrameError::SignalHandlerSetup(std::io::Error::other(e)))?;

    let shutdown = shutdown.clone();
    Ok(runtime.spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::warn!(?err, "failed to listen for Ctrl+C");
                    return;
                }
            }
            _ = shutdown.wait() => return,
        }
        info!(reason = %ShutdownReason::Interrupt, "received termination signal");
        shutdown.trigger(ShutdownReason::Interrupt);
    }))
}
