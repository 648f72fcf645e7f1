//! Semantic color palette for terminal output.

use owo_colors::{OwoColorize, Style};

fn success_style() -> Style {
    Style::new().green().bold()
}

fn info_style() -> Style {
    Style::new().cyan()
}

fn muted_style() -> Style {
    Style::new().dimmed()
}

fn header_style() -> Style {
    Style::new().bold()
}

fn code_style() -> Style {
    Style::new().blue()
}

/// Trait extension to apply semantic styles.
pub trait SemanticStyle {
    /// Green bold.
    fn success(&self) -> String;
    /// Cyan.
    fn info(&self) -> String;
    /// Dimmed.
    fn muted(&self) -> String;
    /// Bold.
    fn header(&self) -> String;
    /// Blue, for addresses and paths.
    fn code(&self) -> String;
}

fn styled<T: std::fmt::Display + ?Sized>(value: &T, style: Style) -> String {
    if super::no_color() {
        value.to_string()
    } else {
        value.style(style).to_string()
    }
}

impl<T: std::fmt::Display + ?Sized> SemanticStyle for T {
    fn success(&self) -> String {
        styled(self, success_style())
    }

    fn info(&self) -> String {
        styled(self, info_style())
    }

    fn muted(&self) -> String {
        styled(self, muted_style())
    }

    fn header(&self) -> String {
        styled(self, header_style())
    }

    fn code(&self) -> String {
        styled(self, code_style())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_color_returns_plain_text() {
        super::super::set_no_color(true);
        assert_eq!("ready".success(), "ready");
        assert_eq!("127.0.0.1:42042".code(), "127.0.0.1:42042");
        assert_eq!(42.header(), "42");
    }
}
