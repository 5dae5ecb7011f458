//! Service Registry
//!
//! Live set of backend instances per service name, refreshed by heartbeats
//! and pruned by TTL. A static name -> address map supplied at startup is
//! consulted when no live instance exists.
//!
//! `resolve` picks the instance with the most recent heartbeat; ties go to
//! the instance registered first. No load balancing is attempted.

use crate::domain::entities::{RegistrySnapshot, ServiceAddress, ServiceRegistration};
use crate::domain::ports::{Clock, RegistryStore, StoreError};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Registry of live backend instances.
pub struct ServiceRegistry {
    /// Dynamic registrations grouped by service name
    services: DashMap<String, Vec<ServiceRegistration>>,
    /// Startup fallback addresses
    static_services: HashMap<String, ServiceAddress>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn RegistryStore>>,
}

impl ServiceRegistry {
    pub fn new(clock: Arc<dyn Clock>, static_services: HashMap<String, ServiceAddress>) -> Self {
        Self {
            services: DashMap::new(),
            static_services,
            clock,
            store: None,
        }
    }

    /// Persist the registry through `store` on `load`/`flush`.
    pub fn with_store(mut self, store: Arc<dyn RegistryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register or refresh an instance.
    ///
    /// A registration for an existing `(name, host, port)` replaces it in
    /// place, so an instance never appears twice.
    pub fn register(
        &self,
        name: &str,
        host: &str,
        port: u16,
        meta: HashMap<String, serde_json::Value>,
    ) -> ServiceRegistration {
        let entry = ServiceRegistration {
            name: name.to_string(),
            host: host.to_string(),
            port,
            meta,
            last_heartbeat_ms: self.clock.now_ms(),
        };

        let mut group = self.services.entry(name.to_string()).or_default();
        match group.iter_mut().find(|s| s.matches(host, port)) {
            Some(existing) => *existing = entry.clone(),
            None => group.push(entry.clone()),
        }

        tracing::info!("registered {} at {}:{}", name, host, port);
        entry
    }

    /// Refresh the heartbeat of a known instance.
    ///
    /// Returns false when the instance is unknown and should re-register.
    pub fn heartbeat(&self, name: &str, host: &str, port: u16) -> bool {
        let now = self.clock.now_ms();
        if let Some(mut group) = self.services.get_mut(name) {
            if let Some(instance) = group.iter_mut().find(|s| s.matches(host, port)) {
                instance.last_heartbeat_ms = now;
                tracing::debug!("heartbeat from {} at {}:{}", name, host, port);
                return true;
            }
        }
        false
    }

    /// Remove an instance, typically on graceful shutdown of that instance.
    pub fn deregister(&self, name: &str, host: &str, port: u16) -> bool {
        let removed = match self.services.get_mut(name) {
            Some(mut group) => {
                let before = group.len();
                group.retain(|s| !s.matches(host, port));
                before != group.len()
            }
            None => false,
        };

        self.services.remove_if(name, |_, group| group.is_empty());

        if removed {
            tracing::info!("deregistered {} at {}:{}", name, host, port);
        }
        removed
    }

    /// Address for a service: the freshest live instance, else the static
    /// mapping, else `None`.
    pub fn resolve(&self, name: &str) -> Option<ServiceAddress> {
        let dynamic = self.services.get(name).and_then(|group| {
            group
                .iter()
                .fold(None::<&ServiceRegistration>, |best, s| match best {
                    Some(b) if b.last_heartbeat_ms >= s.last_heartbeat_ms => Some(b),
                    _ => Some(s),
                })
                .map(ServiceRegistration::address)
        });

        dynamic.or_else(|| self.static_services.get(name).cloned())
    }

    /// Drop every instance whose last heartbeat is older than `ttl`.
    ///
    /// Service names left without instances are removed entirely.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let now = self.clock.now_ms();
        let ttl_ms = ttl.as_millis() as u64;
        let mut removed = 0;

        self.services.retain(|name, group| {
            group.retain(|s| {
                let stale = now.saturating_sub(s.last_heartbeat_ms) > ttl_ms;
                if stale {
                    tracing::info!("removed expired instance {} at {}:{}", name, s.host, s.port);
                    removed += 1;
                }
                !stale
            });
            !group.is_empty()
        });

        removed
    }

    /// Live instances of one service.
    pub fn instances(&self, name: &str) -> Vec<ServiceRegistration> {
        self.services
            .get(name)
            .map(|g| g.value().clone())
            .unwrap_or_default()
    }

    /// Every service name known dynamically or statically, sorted.
    pub fn known_services(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.static_services.keys().cloned().collect();
        names.extend(self.services.iter().map(|e| e.key().clone()));
        names.into_iter().collect()
    }

    /// Current dynamic registrations.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            services: self
                .services
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    /// Replace dynamic registrations with `snapshot`. Empty groups are skipped.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        self.services.clear();
        for (name, group) in snapshot.services {
            if !group.is_empty() {
                self.services.insert(name, group);
            }
        }
    }

    /// Restore from the configured store. Returns the number of instances loaded.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let snapshot = store.load().await?;
        let count = snapshot.instance_count();
        self.restore(snapshot);
        Ok(count)
    }

    /// Write the current registrations to the configured store.
    pub async fn flush(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.save(&self.snapshot()).await,
            None => Ok(()),
        }
    }

    /// Start the background sweep task.
    ///
    /// Runs until a shutdown signal arrives on `shutdown`.
    pub fn start_sweeper(
        self: &Arc<Self>,
        ttl: Duration,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = if interval.is_zero() {
            tracing::warn!("registry sweep interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.recv() => break,
                }

                let removed = registry.sweep(ttl);
                if removed > 0 {
                    tracing::debug!("registry sweep removed {} expired instances", removed);
                    if let Err(e) = registry.flush().await {
                        tracing::error!("failed to persist registry after sweep: {}", e);
                    }
                }
            }
        })
    }
}
