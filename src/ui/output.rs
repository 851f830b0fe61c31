//! Output verbosity.

/// How much a command prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Also print captured output of every step.
    Verbose,
    /// Progress and status.
    #[default]
    Normal,
    /// Errors and the final result only.
    Quiet,
}

impl OutputMode {
    /// Pick the mode from `-v` / `-q`. Quiet wins.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Whether captured step output is printed.
    pub fn shows_command_output(&self) -> bool {
        matches!(self, Self::Verbose)
    }

    /// Whether spinners are drawn.
    pub fn shows_spinners(&self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Whether status lines are printed.
    pub fn shows_status(&self) -> bool {
        !matches!(self, Self::Quiet)
    }
}
