//! Target to coordinator map.
//!
//! The registry is the only process-wide mutable state. Its lock is held for
//! lookup-or-insert and removal only, never across a scrape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::collector::Coordinator;
use crate::config::Config;
use crate::redfish::Connector;

pub struct TargetRegistry<C: Connector> {
    connector: Arc<C>,
    config: Arc<Config>,
    coordinators: Mutex<HashMap<String, Arc<Coordinator<C>>>>,
}

impl<C: Connector> TargetRegistry<C> {
    pub fn new(connector: C, config: Arc<Config>) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            coordinators: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Coordinator<C>>>> {
        self.coordinators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the coordinator for `target`, creating it on first use.
    pub fn resolve(&self, target: &str) -> Arc<Coordinator<C>> {
        let mut coordinators = self.lock();
        if let Some(existing) = coordinators.get(target) {
            return Arc::clone(existing);
        }
        debug!(target, "creating coordinator");
        let coordinator = Arc::new(Coordinator::new(
            target,
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
        ));
        coordinators.insert(target.to_string(), Arc::clone(&coordinator));
        coordinator
    }

    /// Forgets `target`. A scrape already running on the old coordinator
    /// finishes normally; the next `resolve` starts over with discovery.
    pub fn reset(&self, target: &str) -> bool {
        let removed = self.lock().remove(target).is_some();
        if removed {
            info!(target, "target reset");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
