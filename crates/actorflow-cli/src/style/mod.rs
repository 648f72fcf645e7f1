//! Terminal styling for command output.
//!
//! Colors are on by default and switched off globally by `--no-color` or the
//! `NO_COLOR` environment variable.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod banner;
pub mod colors;
pub mod output;

pub use output::*;

/// Global flag to track if colors are disabled.
static NO_COLOR: AtomicBool = AtomicBool::new(false);

/// Sets the global no-color flag.
pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

/// Checks if colors are disabled.
pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}
