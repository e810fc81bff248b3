//! Bounded worker pool for push events.
//!
//! Each worker advertises readiness by putting a fresh one-shot inbox on a
//! shared ready queue, then waits for an event or shutdown. Producers take
//! one ready inbox off the queue and send their event into it, so a
//! producer blocks while every worker is busy.
//!
//! Handlers run as tracked tasks. A worker waits for its handler before
//! advertising again, which bounds in-flight handlers to the pool size.
//! Shutdown stops the workers; handlers already running are waited for,
//! never cancelled.

use async_trait::async_trait;
use hoist_core::PushEvent;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::DispatchError;

type Inbox = oneshot::Sender<PushEvent>;

/// Processes one push event to completion.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: PushEvent);
}

/// Hands push events to a fixed number of workers.
#[derive(Clone)]
pub struct Dispatcher {
    name: &'static str,
    ready: Arc<Mutex<mpsc::Receiver<Inbox>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    max_workers: usize,
}

impl Dispatcher {
    /// Start `max_workers` workers (at least one) running `handler`.
    pub fn start(
        name: &'static str,
        max_workers: usize,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let max_workers = max_workers.max(1);
        let (ready_tx, ready_rx) = mpsc::channel(max_workers);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        for id in 0..max_workers {
            tracker.spawn(worker(
                name,
                id,
                ready_tx.clone(),
                handler.clone(),
                shutdown.clone(),
                tracker.clone(),
            ));
        }
        info!(dispatcher = name, max_workers, "Started dispatcher");

        Self {
            name,
            ready: Arc::new(Mutex::new(ready_rx)),
            shutdown,
            tracker,
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Hand `event` to the next ready worker, waiting for one if all are busy.
    pub async fn dispatch(&self, mut event: PushEvent) -> Result<(), DispatchError> {
        loop {
            let inbox = {
                let mut ready = self.ready.lock().await;
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Err(DispatchError::ShutDown),
                    inbox = ready.recv() => inbox,
                }
            };

            // Queue closes once every worker has stopped.
            let Some(inbox) = inbox else {
                return Err(DispatchError::ShutDown);
            };

            match inbox.send(event) {
                Ok(()) => return Ok(()),
                // The worker stopped after advertising; try the next one.
                Err(returned) => event = returned,
            }
        }
    }

    /// Stop accepting events and wait for in-flight handlers to finish.
    pub async fn shutdown(&self) {
        info!(dispatcher = self.name, "Shutting down dispatcher");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(dispatcher = self.name, "Dispatcher stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

enum Received {
    Event(PushEvent),
    /// Producer gave up before sending.
    Abandoned,
    ShutDown,
}

/// Wait on a worker's inbox. An event that already arrived is still handled
/// during shutdown, including one that lands as shutdown wins the select.
async fn receive(
    events: &mut oneshot::Receiver<PushEvent>,
    shutdown: &CancellationToken,
) -> Received {
    tokio::select! {
        biased;
        event = &mut *events => match event {
            Ok(event) => Received::Event(event),
            Err(_) => Received::Abandoned,
        },
        _ = shutdown.cancelled() => match events.try_recv() {
            Ok(event) => Received::Event(event),
            Err(_) => Received::ShutDown,
        },
    }
}

async fn worker(
    dispatcher: &'static str,
    id: usize,
    ready: mpsc::Sender<Inbox>,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    debug!(dispatcher, worker = id, "Worker started");

    loop {
        let (inbox, mut events) = oneshot::channel();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = ready.send(inbox) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        let event = match receive(&mut events, &shutdown).await {
            Received::Event(event) => event,
            Received::Abandoned => continue,
            Received::ShutDown => break,
        };

        let handler = handler.clone();
        let task = tracker.spawn(async move { handler.handle(event).await });

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = task => {
                if let Err(e) = result {
                    error!(dispatcher, worker = id, error = %e, "Event handler panicked");
                }
            }
        }
    }

    debug!(dispatcher, worker = id, "Worker stopped");
}
