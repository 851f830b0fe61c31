//! Visual theme and styling.

use console::Style;

use crate::state::StepStatus;

/// Styles used across gantry's output.
#[derive(Debug, Clone)]
pub struct GantryTheme {
    /// Succeeded steps (green).
    pub success: Style,
    /// Warnings (yellow).
    pub warning: Style,
    /// Failures (red bold).
    pub error: Style,
    /// Running steps (cyan).
    pub info: Style,
    /// Secondary text.
    pub dim: Style,
    /// Names and other emphasis (bold).
    pub highlight: Style,
    /// Banner (cyan bold).
    pub header: Style,
    /// Durations and timestamps (dim).
    pub duration: Style,
    /// Box-drawing borders (dim).
    pub border: Style,
}

impl Default for GantryTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl GantryTheme {
    /// Colored theme.
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            info: Style::new().cyan(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().cyan().bold(),
            duration: Style::new().dim(),
            border: Style::new().dim(),
        }
    }

    /// Theme without colors (for pipes or `--no-color`).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            duration: Style::new(),
            border: Style::new(),
        }
    }

    /// Pick the theme for the current terminal.
    pub fn detect(no_color: bool) -> Self {
        if !no_color && should_use_colors() {
            Self::new()
        } else {
            Self::plain()
        }
    }

    pub fn format_success(&self, msg: &str) -> String {
        self.success.apply_to(format!("✓ {}", msg)).to_string()
    }

    pub fn format_warning(&self, msg: &str) -> String {
        self.warning.apply_to(format!("⚠ {}", msg)).to_string()
    }

    pub fn format_error(&self, msg: &str) -> String {
        self.error.apply_to(format!("✗ {}", msg)).to_string()
    }

    pub fn format_skipped(&self, msg: &str) -> String {
        self.dim.apply_to(format!("⊘ {}", msg)).to_string()
    }

    /// Banner line.
    pub fn format_header(&self, title: &str) -> String {
        format!(
            "{} {}",
            self.header.apply_to("▲"),
            self.highlight.apply_to(title)
        )
    }

    /// Status icon in the status's color.
    pub fn status_icon(&self, status: &StepStatus) -> String {
        let style = match status {
            StepStatus::Succeeded => &self.success,
            StepStatus::Failed => &self.error,
            StepStatus::Running => &self.info,
            StepStatus::Pending | StepStatus::Skipped { .. } => &self.dim,
        };
        style.apply_to(status.display_char()).to_string()
    }
}

/// Whether colors should be used on stdout.
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    console::Term::stdout().is_term()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SkipReason;

    #[test]
    fn plain_theme_formats_with_icons() {
        let theme = GantryTheme::plain();
        assert_eq!(theme.format_success("provision"), "✓ provision");
        assert_eq!(theme.format_error("push"), "✗ push");
        assert_eq!(theme.format_warning("slow"), "⚠ slow");
        assert_eq!(theme.format_skipped("deploy"), "⊘ deploy");
        assert_eq!(theme.format_header("aks-gitops"), "▲ aks-gitops");
    }

    #[test]
    fn status_icons() {
        let theme = GantryTheme::plain();
        assert_eq!(theme.status_icon(&StepStatus::Succeeded), "✓");
        assert_eq!(
            theme.status_icon(&StepStatus::Skipped {
                reason: SkipReason::Cancelled
            }),
            "⊘"
        );
    }

    #[test]
    fn no_color_forces_plain() {
        let theme = GantryTheme::detect(true);
        assert_eq!(theme.format_success("x"), "✓ x");
    }
}
