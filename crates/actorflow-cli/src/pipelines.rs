//! The reference pipelines run by the `sink`, `reply` and `join` commands.

use std::rc::Rc;

use actorflow::{
    Flow, PipelineResult, Sink, and_then, filter, filter_ok, inspect_err, join, sink, transform,
    values,
};
use actorflow_server::{
    Client, Service, and_then_with_client, filter_with_client, transform_with_client,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::bookmark::{Bookmark, BookmarkError, bookmark_from_json, parse_json};

/// Trims surrounding whitespace.
pub fn trim(line: String) -> String {
    line.trim().to_string()
}

/// Accepts lines that are neither empty nor start with `comment_prefix`.
pub fn is_content(comment_prefix: &str) -> impl Fn(&String) -> bool + Clone + use<> {
    let prefix = Rc::<str>::from(comment_prefix);
    move |line: &String| !line.is_empty() && !line.starts_with(&*prefix)
}

/// `trim | filter(content)` in front of any line flow.
fn clean_lines(lines: Flow<String>, comment_prefix: &str) -> Flow<String> {
    lines | transform(trim) | filter(is_content(comment_prefix))
}

/// Hands every content line received by `service` to `output`.
pub fn line_sink<F>(
    service: Service<String>,
    comment_prefix: &str,
    output: F,
) -> PipelineResult<Sink<String>>
where
    F: Fn(String) + 'static,
{
    clean_lines(service.into(), comment_prefix) | sink(output)
}

/// Merges the lines received by every service into one `output`.
pub fn joined_lines<F>(
    services: Vec<Service<String>>,
    comment_prefix: &str,
    output: F,
) -> PipelineResult<Sink<String>>
where
    F: Fn(String) + 'static,
{
    clean_lines(values(services) | join(), comment_prefix) | sink(output)
}

/// Decodes each content line as a bookmark and hands the good ones to
/// `output`. Lines that fail to decode are logged and dropped.
pub fn bookmark_sink<F>(
    service: Service<String>,
    comment_prefix: &str,
    output: F,
) -> PipelineResult<Sink<Bookmark>>
where
    F: Fn(Bookmark) + 'static,
{
    clean_lines(service.into(), comment_prefix)
        | transform(|line: String| parse_json(&line))
        | and_then(|json: Value| bookmark_from_json(&json))
        | inspect_err(|error: &BookmarkError| warn!(%error, "failed to decode bookmark"))
        | filter_ok()
        | sink(output)
}

/// Outcome of decoding one client line.
pub type Decoded = Client<Result<Bookmark, BookmarkError>>;

/// Decodes each content line as a bookmark and replies to the sender with
/// the bookmark, or with `error_reply` when decoding fails.
pub fn bookmark_replies(
    service: Service<Client<String>>,
    comment_prefix: &str,
    error_reply: &str,
) -> PipelineResult<Sink<Decoded>> {
    let error_reply = format!("{error_reply}\n");

    service
        | transform_with_client(trim)
        | filter_with_client(is_content(comment_prefix))
        | transform_with_client(|line: String| parse_json(&line))
        | and_then_with_client(|json: Value| bookmark_from_json(&json))
        | sink(move |client: Decoded| match client.value() {
            Ok(bookmark) => {
                info!(%bookmark, "This is server: {bookmark}");
                client.reply(format!("{bookmark}\n"));
            }
            Err(error) => {
                warn!(%error, "failed to decode bookmark");
                client.reply(&error_reply);
            }
        })
}
