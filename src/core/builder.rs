use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{broadcaster::Broadcaster, runtime::Runtime, session::Sessions, tracker::Tracker};
use crate::{config::Config, events::Bus, observers::Observe};

/// Builder for constructing a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    observers: Vec<Arc<dyn Observe>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
        }
    }

    /// Sets event observers (logging, metrics, ...).
    ///
    /// Observers receive runtime events through dedicated workers with bounded queues.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Adds one observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the runtime: bus, broadcaster, tracker and root token.
    ///
    /// Nothing is spawned until [`Runtime::run`] / [`Runtime::serve`].
    pub fn build(self) -> Arc<Runtime> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let hub = Broadcaster::new(&self.cfg, bus.clone());
        let tracker = Tracker::new();
        let root = CancellationToken::new();
        let sessions = Sessions::new(hub, tracker.clone(), root.clone());

        Arc::new(Runtime::new_internal(
            self.cfg,
            bus,
            sessions,
            tracker,
            root,
            self.observers,
        ))
    }
}
