//! # Observer fan-out fed from the event bus.
//!
//! ```text
//! Bus ──► listener ──► interested(kind)? ──► [queue] ──► worker ──► observer.on_event()
//!                                        └─► [queue] ──► worker ──► ...
//!
//! stop(): forward what is already on the bus, close the queues, join the workers
//! ```
//!
//! A full queue drops the event for that observer only and publishes
//! `ObserverOverflow`. A listener that lags behind the bus reports it the same
//! way under the name `"bus"`. Overflow events never cause further overflow
//! events. A panic in `on_event` is published as `ObserverPanicked` and the
//! worker carries on with the next event.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event};
use crate::observers::Observe;

struct Queue {
    observer: Arc<dyn Observe>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Per-observer queues and workers.
pub struct ObserverSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ObserverSet {
    /// Spawns one worker per observer.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: Bus) -> Self {
        let mut queues = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for observer in observers {
            let (tx, rx) = mpsc::channel(observer.queue_capacity().max(1));
            workers.push(tokio::spawn(work(Arc::clone(&observer), rx, bus.clone())));
            queues.push(Queue { observer, tx });
        }
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Queues `event` for every observer interested in its kind. Never waits.
    pub fn emit(&self, event: &Event) {
        let mut shared: Option<Arc<Event>> = None;

        for q in &self.queues {
            if !q.observer.interested(event.kind) {
                continue;
            }
            let ev = Arc::clone(shared.get_or_insert_with(|| Arc::new(event.clone())));
            let reason = match q.tx.try_send(ev) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !event.is_observer_overflow() {
                self.bus
                    .publish(Event::observer_overflow(q.observer.name(), reason));
            }
        }
    }

    /// Subscribes to the bus and forwards its events until the handle is stopped.
    ///
    /// Events published after this call returns are seen.
    pub fn listen(self) -> ObserverHandle {
        let rx = self.bus.subscribe();
        let stop = CancellationToken::new();
        let task = tokio::spawn(self.forward(rx, stop.clone()));
        ObserverHandle { stop, task }
    }

    async fn forward(self, mut rx: broadcast::Receiver<Event>, stop: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => self.emit(&ev),
                    Err(RecvError::Lagged(_)) => self.lagged(),
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => self.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    fn lagged(&self) {
        self.emit(&Event::observer_overflow("bus", "lagged"));
    }

    /// Closes the queues and waits for every worker to finish what was queued.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Running [`ObserverSet`] listener.
pub struct ObserverHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// Drains pending bus events into the observers, then stops them.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

async fn work(observer: Arc<dyn Observe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(observer.on_event(&ev)).catch_unwind();
        if let Err(panic) = handled.await {
            bus.publish(Event::observer_panicked(observer.name(), panic_message(&*panic)));
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
