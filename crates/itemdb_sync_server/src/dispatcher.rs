//! Single-owner dispatch of requests to the [`RequestHandler`].
//!
//! Socket tasks never touch the database. They queue jobs on a bounded
//! channel; one blocking task drains it, so every call runs against the
//! database in arrival order.

use crate::error::{ServerError, ServerResult};
use crate::handler::{RequestHandler, SessionId};
use bytes::Bytes;
use itemdb_sync_protocol::{RequestHeader, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Work for the dispatcher.
#[derive(Debug)]
pub(crate) enum Job {
    /// A request payload whose response goes back through `reply`.
    Request {
        session: SessionId,
        header: RequestHeader,
        args: Bytes,
        reply: oneshot::Sender<Response>,
    },
    /// The socket behind `session` went away.
    Disconnect { session: SessionId },
}

/// Cloneable handle for queueing jobs.
#[derive(Debug, Clone)]
pub(crate) struct DispatcherHandle {
    jobs: mpsc::Sender<Job>,
}

impl DispatcherHandle {
    /// Queues a request. Jobs run in the order they were queued.
    pub(crate) async fn submit(
        &self,
        session: SessionId,
        header: RequestHeader,
        args: Bytes,
    ) -> ServerResult<oneshot::Receiver<Response>> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Job::Request {
                session,
                header,
                args,
                reply,
            })
            .await
            .map_err(|_| ServerError::Shutdown)?;
        Ok(response)
    }

    /// Queues a request and waits for its response.
    #[cfg(test)]
    pub(crate) async fn call(
        &self,
        session: SessionId,
        header: RequestHeader,
        args: Bytes,
    ) -> ServerResult<Response> {
        let response = self.submit(session, header, args).await?;
        response.await.map_err(|_| ServerError::Shutdown)
    }

    /// Tells the dispatcher a session ended.
    pub(crate) async fn disconnect(&self, session: SessionId) {
        if self.jobs.send(Job::Disconnect { session }).await.is_err() {
            tracing::debug!(session, "dispatcher gone before disconnect");
        }
    }
}

/// Starts the dispatcher. The task ends, handing the handler back, once
/// every [`DispatcherHandle`] is dropped.
pub(crate) fn spawn(handler: RequestHandler, queue: usize) -> (DispatcherHandle, JoinHandle<RequestHandler>) {
    let (jobs, receiver) = mpsc::channel(queue);
    let task = tokio::task::spawn_blocking(move || run(handler, receiver));
    (DispatcherHandle { jobs }, task)
}

fn run(mut handler: RequestHandler, mut jobs: mpsc::Receiver<Job>) -> RequestHandler {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Request {
                session,
                header,
                args,
                reply,
            } => {
                let response = handler.handle_frame(session, header, &args);
                if reply.send(response).is_err() {
                    tracing::debug!(session, correlation = header.correlation, "socket gone before reply");
                }
            }
            Job::Disconnect { session } => handler.disconnect(session),
        }
    }
    tracing::debug!("dispatcher stopped");
    handler
}
