//! Inbound interception event.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::message::Request;

/// A request intercepted by the host, together with the means to extend its
/// lifetime with background work.
///
/// Work passed to [`FetchEvent::wait_until`] runs on its own task; the host
/// calls [`FetchEvent::settled`] to wait until all of it has finished.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    request: Request,
    tracker: TaskTracker,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            tracker: TaskTracker::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Run `future` as part of this event's unit of work.
    pub fn wait_until<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Number of extensions still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every extension registered so far (and any they register)
    /// to finish.
    pub async fn settled(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
