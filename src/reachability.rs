//! Host reachability.
//!
//! The client asks a [`Reachability`] source whether the host can be reached
//! before sending, and listens for transitions to drain its retry queue.
//! Two sources are provided: [`ManualReachability`], driven by the
//! application, and [`TcpProbe`], which periodically opens a TCP connection
//! to the host.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use url::Url;

/// A source of reachability state.
pub trait Reachability: Send + Sync + 'static {
    /// Returns the current state without blocking.
    fn is_reachable(&self) -> bool;

    /// Starts monitoring and returns a receiver that observes every state
    /// change.
    ///
    /// # Errors
    ///
    /// Returns an error if monitoring cannot start. The client then treats
    /// the host as always reachable.
    fn start(&self) -> Result<watch::Receiver<bool>>;
}

/// Reachability set explicitly by the application.
///
/// Clones share state, so one clone can be handed to the client while
/// another is kept to flip the state.
///
/// ```
/// use courier::{ManualReachability, Reachability};
///
/// let reachability = ManualReachability::new(false);
/// assert!(!reachability.is_reachable());
/// reachability.set_reachable(true);
/// assert!(reachability.is_reachable());
/// ```
#[derive(Debug, Clone)]
pub struct ManualReachability {
    state: Arc<watch::Sender<bool>>,
}

impl ManualReachability {
    /// Creates a source with the given initial state.
    pub fn new(reachable: bool) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(reachable)),
        }
    }

    /// Updates the state. Observers are only notified when it changes.
    pub fn set_reachable(&self, reachable: bool) {
        publish(&self.state, reachable);
    }
}

impl Default for ManualReachability {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reachability for ManualReachability {
    fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    fn start(&self) -> Result<watch::Receiver<bool>> {
        Ok(self.state.subscribe())
    }
}

/// Probes the host by opening a TCP connection at a fixed interval.
///
/// The state starts out reachable until the first probe says otherwise.
/// Probing stops once every receiver returned by [`start`](Reachability::start)
/// has been dropped.
#[derive(Debug)]
pub struct TcpProbe {
    address: String,
    interval: Duration,
    connect_timeout: Duration,
    state: Arc<watch::Sender<bool>>,
    started: AtomicBool,
}

impl TcpProbe {
    /// Creates a probe for the host and port of `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host or no known default port.
    pub fn new(host: &Url) -> Result<Self> {
        let name = host
            .host_str()
            .ok_or_else(|| Error::ConfigurationError(format!("URL has no host: {}", host)))?;
        let port = host.port_or_known_default().ok_or_else(|| {
            Error::ConfigurationError(format!("URL has no known port: {}", host))
        })?;

        Ok(Self {
            address: format!("{}:{}", name, port),
            interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            state: Arc::new(watch::Sender::new(true)),
            started: AtomicBool::new(false),
        })
    }

    /// Sets the time between probes. Defaults to 5 seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long a single probe may take. Defaults to 3 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The `host:port` being probed.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Reachability for TcpProbe {
    fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    fn start(&self) -> Result<watch::Receiver<bool>> {
        let receiver = self.state.subscribe();
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(receiver);
        }

        let runtime = Handle::try_current().map_err(|e| {
            self.started.store(false, Ordering::SeqCst);
            Error::ConfigurationError(format!("Reachability probe needs a Tokio runtime: {}", e))
        })?;

        let state = Arc::clone(&self.state);
        let address = self.address.clone();
        let interval = self.interval;
        let connect_timeout = self.connect_timeout;

        runtime.spawn(async move {
            loop {
                let reachable = matches!(
                    tokio::time::timeout(connect_timeout, TcpStream::connect(address.as_str())).await,
                    Ok(Ok(_))
                );
                publish(&state, reachable);

                if state.is_closed() {
                    tracing::debug!(address = %address, "Reachability probe stopped");
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        tracing::debug!(address = %self.address, "Reachability probe started");
        Ok(receiver)
    }
}

fn publish(state: &watch::Sender<bool>, reachable: bool) {
    let changed = state.send_if_modified(|current| {
        let changed = *current != reachable;
        *current = reachable;
        changed
    });
    if changed {
        tracing::info!(reachable, "Reachability changed");
    }
}
