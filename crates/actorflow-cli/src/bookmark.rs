//! Bookmark decoding for the reply pipeline.
//!
//! Clients send one JSON object per line, e.g.
//! `{"FirstUrl": "http://example.com", "Text": "Example"}`.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A decoded bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bookmark {
    #[serde(rename = "FirstUrl")]
    pub url: String,
    #[serde(rename = "Text")]
    pub text: String,
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bookmark[url: {}, text: {}]", self.url, self.text)
    }
}

/// Why a line did not become a bookmark.
#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("not a bookmark: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Parses one line of text as JSON.
pub fn parse_json(text: &str) -> Result<Value, BookmarkError> {
    serde_json::from_str(text).map_err(BookmarkError::Json)
}

/// Reads the `FirstUrl` and `Text` string fields of a JSON object.
///
/// Other fields are ignored.
pub fn bookmark_from_json(json: &Value) -> Result<Bookmark, BookmarkError> {
    Bookmark::deserialize(json).map_err(BookmarkError::Shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn decodes_and_formats_a_bookmark() {
        let json = parse_json(r#"{"FirstUrl":"http://x","Text":"y"}"#).expect("valid JSON");

        let bookmark = bookmark_from_json(&json).expect("valid bookmark");

        assert_eq!(bookmark.to_string(), "Bookmark[url: http://x, text: y]");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let json = parse_json(r#"{"FirstUrl":"http://x","Text":"y","Icon":{"URL":""}}"#)
            .expect("valid JSON");

        let bookmark = bookmark_from_json(&json).expect("valid bookmark");

        assert_eq!(
            bookmark,
            Bookmark {
                url: "http://x".to_string(),
                text: "y".to_string(),
            }
        );
    }

    #[test_case("not json"; "plain text")]
    #[test_case(r#"{"FirstUrl": "#; "truncated object")]
    fn malformed_text_is_a_json_error(line: &str) {
        assert!(matches!(parse_json(line), Err(BookmarkError::Json(_))));
    }

    #[test_case(r#"{"Text":"y"}"#; "missing url")]
    #[test_case(r#"{"FirstUrl":"http://x"}"#; "missing text")]
    #[test_case(r#"{"FirstUrl":1,"Text":"y"}"#; "url not a string")]
    #[test_case(r#""http://x""#; "string")]
    #[test_case("null"; "null")]
    fn wrong_shape_is_a_shape_error(line: &str) {
        let json = parse_json(line).expect("valid JSON");

        assert!(matches!(
            bookmark_from_json(&json),
            Err(BookmarkError::Shape(_))
        ));
    }
}
