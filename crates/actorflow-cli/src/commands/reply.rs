//! Reply command - decodes bookmarks and answers each sender.

use actorflow_config::ActorflowConfig;
use actorflow_server::Service;
use anyhow::{Context, Result};

use crate::pipelines::bookmark_replies;

pub fn run(config: &ActorflowConfig, address: Option<&str>) -> Result<()> {
    let bind_addr = match address {
        Some(address) => super::parse_address(address, &config.server)?,
        None => config.server.to_server_config()?.bind_addr,
    };

    let reactor = super::reactor(&config.server)?;
    let service =
        Service::bind_with_client(reactor.handle(), bind_addr).context("Failed to bind")?;
    let local_addr = service.local_addr();

    let _pipeline = bookmark_replies(
        service,
        &config.pipelines.comment_prefix,
        &config.pipelines.error_reply,
    )
    .context("Failed to wire pipeline")?;

    super::serve(reactor, "reply", &[local_addr])
}
