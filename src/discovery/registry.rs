//! # Registry Client
//!
//! [`InstanceRegistry`] is the seam between routing and whatever service
//! registry the host runs. [`ServiceRegistry`] is the in-memory implementation
//! used by the binary and by tests: instances are kept per service in a
//! `DashMap` and every change is announced on a broadcast channel.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::error::RoutingResult;
use crate::core::types::{HealthStatus, ServiceInstance};

/// Source of live instances for a service
pub trait InstanceRegistry: Send + Sync {
    /// Healthy instances of `service` in `group`
    ///
    /// An unknown service yields an empty list. Backends that can fail
    /// (network, timeouts) report it as `RoutingError::TransientLookup`.
    fn healthy_instances(&self, service: &str, group: &str) -> RoutingResult<Vec<Arc<ServiceInstance>>>;
}

/// Service change event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceChangeEvent {
    /// A new instance was registered
    InstanceRegistered(ServiceInstance),
    /// An instance was removed
    InstanceDeregistered(String),
    /// An instance's health status changed
    HealthChanged {
        instance_id: String,
        old_status: HealthStatus,
        new_status: HealthStatus,
    },
    /// An already registered instance was replaced
    MetadataUpdated {
        instance_id: String,
        metadata: HashMap<String, String>,
    },
}

pub type ServiceChangeReceiver = broadcast::Receiver<ServiceChangeEvent>;
pub type ServiceChangeSender = broadcast::Sender<ServiceChangeEvent>;

/// In-memory registry indexed by service name and by instance id
pub struct ServiceRegistry {
    services: DashMap<String, Vec<Arc<ServiceInstance>>>,
    instances: DashMap<String, Arc<ServiceInstance>>,
    change_sender: ServiceChangeSender,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let (change_sender, _) = broadcast::channel(1000);

        Self {
            services: DashMap::new(),
            instances: DashMap::new(),
            change_sender,
        }
    }

    /// Every instance of a service, healthy or not
    pub fn service_instances(&self, service: &str) -> Vec<Arc<ServiceInstance>> {
        self.services
            .get(service)
            .map(|instances| instances.clone())
            .unwrap_or_default()
    }

    pub fn instance(&self, instance_id: &str) -> Option<Arc<ServiceInstance>> {
        self.instances.get(instance_id).map(|instance| Arc::clone(&instance))
    }

    /// Add or replace an instance
    pub fn add_instance(&self, instance: ServiceInstance) {
        let instance_id = instance.id.clone();
        let service = instance.service.clone();
        let instance_arc = Arc::new(instance.clone());

        let previous = self.instances.insert(instance_id.clone(), Arc::clone(&instance_arc));

        // A replaced instance may have moved to another service.
        if let Some(previous) = &previous {
            if previous.service != service {
                self.detach(&previous.service, &instance_id);
            }
        }

        {
            let mut list = self.services.entry(service).or_default();
            list.retain(|existing| existing.id != instance_id);
            list.push(instance_arc);
        }

        let event = if previous.is_some() {
            ServiceChangeEvent::MetadataUpdated {
                instance_id: instance_id.clone(),
                metadata: instance.metadata,
            }
        } else {
            ServiceChangeEvent::InstanceRegistered(instance)
        };
        self.announce(event);

        debug!(instance = %instance_id, "Added/updated service instance");
    }

    /// Remove an instance; returns whether it was registered
    pub fn remove_instance(&self, instance_id: &str) -> bool {
        let Some((_, instance)) = self.instances.remove(instance_id) else {
            return false;
        };

        self.detach(&instance.service, instance_id);
        self.announce(ServiceChangeEvent::InstanceDeregistered(instance_id.to_string()));

        debug!(instance = %instance_id, service = %instance.service, "Removed service instance");
        true
    }

    /// Change the health status of an instance; returns whether it was registered
    pub fn update_instance_health(&self, instance_id: &str, new_status: HealthStatus) -> bool {
        let (updated, old_status) = {
            let Some(mut instance_ref) = self.instances.get_mut(instance_id) else {
                return false;
            };
            let old_status = instance_ref.health_status;
            let mut updated = (**instance_ref).clone();
            updated.health_status = new_status;
            let updated = Arc::new(updated);
            *instance_ref = Arc::clone(&updated);
            (updated, old_status)
        };

        if let Some(mut list) = self.services.get_mut(&updated.service) {
            if let Some(slot) = list.iter_mut().find(|existing| existing.id == instance_id) {
                *slot = Arc::clone(&updated);
            }
        }

        self.announce(ServiceChangeEvent::HealthChanged {
            instance_id: instance_id.to_string(),
            old_status,
            new_status,
        });

        debug!(instance = %instance_id, status = %new_status, "Updated instance health");
        true
    }

    pub fn subscribe_to_changes(&self) -> ServiceChangeReceiver {
        self.change_sender.subscribe()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn detach(&self, service: &str, instance_id: &str) {
        let now_empty = match self.services.get_mut(service) {
            Some(mut list) => {
                list.retain(|existing| existing.id != instance_id);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.services.remove_if(service, |_, list| list.is_empty());
        }
    }

    fn announce(&self, event: ServiceChangeEvent) {
        // No subscriber is the normal case.
        let _ = self.change_sender.send(event);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl InstanceRegistry for ServiceRegistry {
    fn healthy_instances(&self, service: &str, group: &str) -> RoutingResult<Vec<Arc<ServiceInstance>>> {
        Ok(self
            .service_instances(service)
            .into_iter()
            .filter(|instance| instance.is_healthy() && instance.group == group)
            .collect())
    }
}
