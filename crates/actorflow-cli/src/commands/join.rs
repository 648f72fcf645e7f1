//! Join command - merges the lines received on several ports.

use std::net::SocketAddr;

use actorflow_config::ActorflowConfig;
use actorflow_server::Service;
use anyhow::{Context, Result, bail};
use tracing::info;

use crate::pipelines::joined_lines;

pub fn run(config: &ActorflowConfig, addresses: &[String]) -> Result<()> {
    let addrs = if addresses.is_empty() {
        config
            .pipelines
            .join_ports
            .iter()
            .map(|port| Ok(config.server.bind_address_with_port(*port)?))
            .collect::<Result<Vec<SocketAddr>>>()?
    } else {
        addresses
            .iter()
            .map(|address| super::parse_address(address, &config.server))
            .collect::<Result<Vec<SocketAddr>>>()?
    };
    if addrs.is_empty() {
        bail!("Nothing to join. Pass --ports or set pipelines.join_ports.");
    }

    let reactor = super::reactor(&config.server)?;
    let services = addrs
        .iter()
        .map(|addr| {
            Service::bind(reactor.handle(), *addr).with_context(|| format!("Failed to bind {addr}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let listening: Vec<SocketAddr> = services.iter().map(Service::local_addr).collect();

    let _pipeline = joined_lines(services, &config.pipelines.comment_prefix, |line| {
        info!(%line, "line received");
        println!("{line}");
    })
    .context("Failed to wire pipeline")?;

    super::serve(reactor, "join", &listening)
}
