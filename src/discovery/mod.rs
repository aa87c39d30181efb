pub mod publisher;
pub mod registry;

pub use publisher::{TargetServiceChangedPublisher, TargetServicePublisher, TargetServiceReceiver};
pub use registry::{
    InstanceRegistry, ServiceChangeEvent, ServiceChangeReceiver, ServiceChangeSender, ServiceRegistry,
};
