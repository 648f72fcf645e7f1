//! Banner printed when a pipeline starts.

use super::colors::SemanticStyle;

const BANNER: &str = "  ◆ A C T O R F L O W";

/// Prints the banner with the name of the running pipeline.
pub fn print_banner(pipeline: &str) {
    println!();
    println!("{}", BANNER.info());
    println!("  {}", format!("{pipeline} pipeline").muted());
    println!();
}
