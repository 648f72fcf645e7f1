//! CLI command implementations.

use std::net::SocketAddr;

use actorflow_config::ServerSection;
use actorflow_server::{Reactor, ServerConfig};
use anyhow::{Context, Result, bail};

use crate::style::banner::print_banner;
use crate::style::colors::SemanticStyle;
use crate::style::{print_hint, print_labeled, print_spacer, print_success};

pub mod config;
pub mod join;
pub mod reply;
pub mod sink;
pub mod version;

/// Parses an address string into a `SocketAddr`.
///
/// Accepts:
/// - Port only: "42042" -> the configured bind IP with that port
/// - Full address: "127.0.0.1:42042"
/// - IPv6: `[::1]:42042`
pub fn parse_address(address: &str, server: &ServerSection) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(port) = address.parse::<u16>() {
        return Ok(server.bind_address_with_port(port)?);
    }

    bail!(
        "Invalid address '{address}'. Use a port (e.g., '42042') or full address (e.g., '127.0.0.1:42042')"
    );
}

/// Builds the reactor for a command, with Ctrl+C handling installed.
fn reactor(server: &ServerSection) -> Result<Reactor> {
    let config: ServerConfig = server
        .to_server_config()
        .context("Invalid server configuration")?;
    let reactor = Reactor::new(config)
        .context("Failed to create reactor")?
        .with_signal_handling()
        .context("Failed to install signal handlers")?;
    Ok(reactor)
}

/// Prints the startup banner, runs the reactor until shutdown and reports
/// the stop.
fn serve(mut reactor: Reactor, pipeline: &str, listening: &[SocketAddr]) -> Result<()> {
    print_banner(pipeline);
    for addr in listening {
        print_labeled("Listening", &addr.code());
    }
    if let Some(metrics) = reactor.config().metrics_addr {
        print_labeled("Metrics", &format!("http://{metrics}/metrics").code());
    }
    print_spacer();
    print_hint("Press Ctrl+C to stop.");
    print_spacer();

    reactor.run().context("Reactor error during operation")?;

    print_spacer();
    print_success("Pipeline stopped gracefully.");
    Ok(())
}
