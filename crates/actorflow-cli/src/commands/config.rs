//! Config command - shows the effective configuration.

use actorflow_config::ActorflowConfig;
use anyhow::Result;

use crate::style::{print_labeled, print_section, print_spacer};

/// Show current configuration.
pub fn show(config: &ActorflowConfig, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "toml" => println!("{}", config.to_toml()?),
        _ => {
            let server = &config.server;
            print_section("Server");
            print_labeled("Bind address", &server.bind_address);
            print_labeled(
                "Idle timeout",
                &if server.idle_timeout_secs == 0 {
                    "disabled".to_string()
                } else {
                    format!("{}s", server.idle_timeout_secs)
                },
            );
            print_labeled("Max line length", &server.max_line_length.to_string());
            print_labeled("Max sessions", &server.max_sessions.to_string());
            print_labeled("Read buffer", &server.read_buffer_size.to_string());
            print_labeled(
                "Read per dispatch",
                &server.max_read_per_dispatch.to_string(),
            );
            print_labeled("Tick", &format!("{}ms", server.tick_ms));
            print_labeled(
                "Metrics",
                server.metrics_address.as_deref().unwrap_or("disabled"),
            );
            print_spacer();

            let pipelines = &config.pipelines;
            print_section("Pipelines");
            print_labeled("Comment prefix", &pipelines.comment_prefix);
            print_labeled("Error reply", &pipelines.error_reply);
            print_labeled(
                "Join ports",
                &pipelines
                    .join_ports
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
    }
    Ok(())
}
