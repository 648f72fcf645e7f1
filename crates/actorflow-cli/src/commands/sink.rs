//! Sink command - prints every line, or every bookmark, received on a port.

use actorflow_config::ActorflowConfig;
use actorflow_server::Service;
use anyhow::{Context, Result};
use tracing::info;

use crate::pipelines::{bookmark_sink, line_sink};

pub fn run(config: &ActorflowConfig, address: Option<&str>, bookmarks: bool) -> Result<()> {
    let bind_addr = match address {
        Some(address) => super::parse_address(address, &config.server)?,
        None => config.server.to_server_config()?.bind_addr,
    };

    let reactor = super::reactor(&config.server)?;
    let service = Service::bind(reactor.handle(), bind_addr).context("Failed to bind")?;
    let local_addr = service.local_addr();
    let comment_prefix = &config.pipelines.comment_prefix;

    if bookmarks {
        let _pipeline = bookmark_sink(service, comment_prefix, |bookmark| {
            info!(%bookmark, "bookmark received");
            println!("{bookmark}");
        })
        .context("Failed to wire pipeline")?;
        super::serve(reactor, "bookmark sink", &[local_addr])
    } else {
        let _pipeline = line_sink(service, comment_prefix, |line| {
            info!(%line, "line received");
            println!("{line}");
        })
        .context("Failed to wire pipeline")?;
        super::serve(reactor, "sink", &[local_addr])
    }
}
