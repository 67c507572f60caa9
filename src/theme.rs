//! Color theming for terminal and table output.
//!
//! Colors can be disabled globally with `--no-color` or `NO_COLOR`; every
//! helper here then returns unstyled output.

use std::sync::atomic::{AtomicBool, Ordering};

static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable all colors globally, for both owo_colors and comfy_table.
pub fn disable_colors() {
    COLORS_ENABLED.store(false, Ordering::Relaxed);
    owo_colors::set_override(false);
}

pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

/// Semantic color categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    /// Successful conversions.
    Converted,
    /// Equations the renderer refused.
    Rejected,
    /// Renderer process failures.
    Failed,
    /// Input formats and counter values.
    Value,
}

/// The comfy_table color for a category, or `None` when colors are off.
pub fn table_color(semantic: Semantic) -> Option<comfy_table::Color> {
    if !colors_enabled() {
        return None;
    }
    Some(match semantic {
        Semantic::Converted => comfy_table::Color::Green,
        Semantic::Rejected => comfy_table::Color::Yellow,
        Semantic::Failed => comfy_table::Color::Red,
        Semantic::Value => comfy_table::Color::Cyan,
    })
}

pub trait ThemedCell {
    fn themed(self, semantic: Semantic) -> Self;
}

impl ThemedCell for comfy_table::Cell {
    fn themed(self, semantic: Semantic) -> Self {
        match table_color(semantic) {
            Some(color) => self.fg(color),
            None => self,
        }
    }
}

/// owo_colors styling that respects [`disable_colors`].
pub trait Themed: owo_colors::OwoColorize {
    /// Red and bold.
    fn error_style(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!(
                "{}",
                owo_colors::OwoColorize::bold(&owo_colors::OwoColorize::red(self))
            )
        } else {
            self.to_string()
        }
    }

    /// Yellow.
    fn label(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::yellow(self))
        } else {
            self.to_string()
        }
    }

    /// Cyan.
    fn count(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::cyan(self))
        } else {
            self.to_string()
        }
    }
}

impl Themed for String {}
impl Themed for &str {}
impl Themed for u64 {}
impl Themed for usize {}
