//! VM DHCP Controller
//!
//! Reconciles IPPool resources: builds the in-memory IPAM and MAC/IP
//! binding cache for each pool and launches one DHCP agent pod per pool on
//! the nodes attached to the pool's cluster network.

use std::env;

use tracing::info;

use vm_dhcp_controller::config::ControllerOptions;
use vm_dhcp_controller::controller::Controller;
use vm_dhcp_controller::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("starting vm-dhcp controller");

    let options = ControllerOptions::from_env()?;
    let watch_namespace = env::var("WATCH_NAMESPACE").ok();

    info!("configuration:");
    info!("  agent namespace: {}", options.agent_namespace);
    info!("  agent image: {}", options.agent_image);
    info!(
        "  watch namespace: {}",
        watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    if options.no_agent {
        info!("  agent workloads disabled");
    }
    if options.no_dhcp {
        info!("  agents run with --dry-run");
    }

    let controller = Controller::new(options, watch_namespace).await?;
    controller.run().await?;

    Ok(())
}
