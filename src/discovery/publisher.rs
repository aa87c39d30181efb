//! Change-notification publisher.
//!
//! Tells the control plane which services routing is interested in, so it
//! keeps pushing rule updates for them. Publishing is fire-and-forget.

use dashmap::DashSet;
use tokio::sync::broadcast;
use tracing::debug;

/// Subscription hint for services that routing cares about
pub trait TargetServicePublisher: Send + Sync {
    fn add_target_service(&self, service: &str);
}

pub type TargetServiceReceiver = broadcast::Receiver<String>;

/// Records target services and broadcasts each one the first time it is seen
pub struct TargetServiceChangedPublisher {
    targets: DashSet<String>,
    sender: broadcast::Sender<String>,
}

impl TargetServiceChangedPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            targets: DashSet::new(),
            sender,
        }
    }

    pub fn subscribe(&self) -> TargetServiceReceiver {
        self.sender.subscribe()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.targets.contains(service)
    }

    /// Known target services, sorted
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.targets.iter().map(|t| t.key().clone()).collect();
        targets.sort();
        targets
    }
}

impl Default for TargetServiceChangedPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetServicePublisher for TargetServiceChangedPublisher {
    fn add_target_service(&self, service: &str) {
        if self.targets.contains(service) || !self.targets.insert(service.to_string()) {
            return;
        }

        debug!(service = %service, "New routing target service");
        // Nobody listening is not an error.
        let _ = self.sender.send(service.to_string());
    }
}

impl std::fmt::Debug for TargetServiceChangedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetServiceChangedPublisher")
            .field("targets", &self.targets.len())
            .finish()
    }
}
