//! # Label Router - Dry Run
//!
//! Loads a router configuration, installs its routing data and static
//! instances, then makes one routing decision per configured target service
//! and logs the outcome.
//!
//! The configuration path is the first argument, else `LABEL_ROUTER_CONFIG_PATH`,
//! else `config/label-router.yaml`.

use std::sync::Arc;
use tracing::{error, info, warn};

use label_router::observability::init_logging;
use label_router::{
    RequestAttributes, RouterConfig, RoutingDataRepository, RoutingLoadBalanceRule, RoutingResult,
    ServiceRegistry, TargetServiceChangedPublisher,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be up yet.
        eprintln!("label-router: {}", e);
        error!(error = %e, "Dry run failed");
        std::process::exit(1);
    }
}

async fn run() -> RoutingResult<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("LABEL_ROUTER_CONFIG_PATH").ok())
        .unwrap_or_else(|| "config/label-router.yaml".to_string());

    let config = RouterConfig::load(&config_path).await?;
    init_logging(&config.logging)?;

    info!(
        path = %config_path,
        version = env!("CARGO_PKG_VERSION"),
        routes = config.routes.len(),
        instances = config.instances.len(),
        "Configuration loaded"
    );

    let rule = build_rule(&config);

    for route in &config.routes {
        let service = &route.target_service;
        let attrs = RequestAttributes::new("/");
        match rule.choose(service, None, &attrs) {
            Some(instance) => info!(
                service = %service,
                instance = %instance.id,
                address = %instance.address(),
                version = ?instance.version(),
                "Dry run selected instance"
            ),
            None => warn!(service = %service, "Dry run selected no instance"),
        }
    }

    Ok(())
}

fn build_rule(config: &RouterConfig) -> RoutingLoadBalanceRule {
    let repository = Arc::new(RoutingDataRepository::new());
    repository.update_route_data(config.routes.clone());

    let registry = Arc::new(ServiceRegistry::new());
    for instance in &config.instances {
        registry.add_instance(instance.clone());
    }

    RoutingLoadBalanceRule::new(
        repository,
        registry,
        Arc::new(TargetServiceChangedPublisher::new()),
        config.label_routing.clone(),
    )
}
