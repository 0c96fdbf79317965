//! Result delivery.
//!
//! Every request ends in exactly one outcome, handed to each of its
//! [`Listener`]s: callbacks are invoked directly and channel listeners get a
//! [`Notification`] posted to the client's [`NotificationCenter`].
//!
//! Delivery always happens on a [`DeliveryContext`], a serial executor that
//! plays the role of an application's main thread. Jobs run one at a time in
//! the order they were submitted, so observers need no locking of their own.

use crate::notification::{Notification, NotificationCenter, DATA_KEY, ERROR_KEY};
use crate::Error;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// The materialized objects of a successful request.
pub type Objects<T> = Arc<Vec<T>>;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where an outcome is delivered.
pub enum Listener<A> {
    /// Invoke a function with the outcome.
    Callback(Arc<dyn Fn(A) + Send + Sync>),
    /// Post a notification under this name.
    Channel(String),
}

impl<A> Listener<A> {
    /// A callback listener.
    pub fn callback(f: impl Fn(A) + Send + Sync + 'static) -> Self {
        Listener::Callback(Arc::new(f))
    }

    /// A named broadcast listener.
    pub fn channel(name: impl Into<String>) -> Self {
        Listener::Channel(name.into())
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        match self {
            Listener::Callback(f) => Listener::Callback(Arc::clone(f)),
            Listener::Channel(name) => Listener::Channel(name.clone()),
        }
    }
}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Callback(_) => f.write_str("Callback(..)"),
            Listener::Channel(name) => f.debug_tuple("Channel").field(name).finish(),
        }
    }
}

/// Handle to the serial executor that runs deliveries.
///
/// Cloning yields another handle to the same executor.
#[derive(Clone)]
pub struct DeliveryContext {
    jobs: mpsc::UnboundedSender<Job>,
}

/// The receiving end of a [`DeliveryContext`], driven by its owner.
///
/// Use this when the application already has a main loop and wants results
/// delivered there.
pub struct DeliveryLoop {
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl DeliveryContext {
    /// Creates a context whose jobs are run by the returned loop.
    pub fn channel() -> (Self, DeliveryLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { jobs: tx }, DeliveryLoop { jobs: rx })
    }

    /// Creates a context driven by a dedicated task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_on(&Handle::current())
    }

    /// Creates a context driven by a dedicated task on `handle`.
    pub fn spawn_on(handle: &Handle) -> Self {
        let (context, delivery_loop) = Self::channel();
        handle.spawn(delivery_loop.run());
        context
    }

    /// Queues `job` for execution. Returns `false` if the loop is gone.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.jobs.send(Box::new(job)).is_ok()
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

impl DeliveryLoop {
    /// Runs jobs until every [`DeliveryContext`] handle has been dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            run_job(job);
        }
    }

    /// Runs the jobs that are already queued and returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.jobs.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }
}

// A panicking observer must not take the loop or its siblings down with it.
fn run_job(job: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic = %message, "Result listener panicked");
    }
}

/// Delivers outcomes to listeners on the delivery context.
#[derive(Clone)]
pub struct Dispatcher {
    center: NotificationCenter,
    context: DeliveryContext,
}

impl Dispatcher {
    /// Creates a dispatcher posting to `center` and running on `context`.
    pub fn new(center: NotificationCenter, context: DeliveryContext) -> Self {
        Self { center, context }
    }

    /// The center channel listeners are posted to.
    pub fn notification_center(&self) -> &NotificationCenter {
        &self.center
    }

    /// Delivers a success outcome.
    pub fn succeed<T>(&self, listeners: &[Listener<Objects<T>>], objects: Vec<T>)
    where
        T: Send + Sync + 'static,
    {
        let objects: Objects<T> = Arc::new(objects);
        let user_info: Arc<dyn Any + Send + Sync> = objects.clone();
        self.deliver(listeners, objects, DATA_KEY, user_info);
    }

    /// Delivers a failure outcome.
    pub fn fail(&self, listeners: &[Listener<Arc<Error>>], error: Error) {
        tracing::debug!(error = %error, "Delivering failure");
        let error = Arc::new(error);
        let user_info: Arc<dyn Any + Send + Sync> = error.clone();
        self.deliver(listeners, error, ERROR_KEY, user_info);
    }

    fn deliver<A>(
        &self,
        listeners: &[Listener<A>],
        payload: A,
        key: &'static str,
        user_info: Arc<dyn Any + Send + Sync>,
    ) where
        A: Clone + Send + 'static,
    {
        if listeners.is_empty() {
            tracing::debug!(key, "No listeners configured; dropping outcome");
            return;
        }

        let listeners = listeners.to_vec();
        let center = self.center.clone();
        let accepted = self.context.execute(move || {
            for listener in listeners {
                match listener {
                    Listener::Channel(name) => {
                        center.post(Notification::new(name).with_user_info(key, user_info.clone()));
                    }
                    Listener::Callback(f) => {
                        let payload = payload.clone();
                        run_job(move || f(payload));
                    }
                }
            }
        });

        if !accepted {
            tracing::warn!(key, "Delivery context has shut down; outcome dropped");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("center", &self.center)
            .field("context", &self.context)
            .finish()
    }
}
