//! Secret detection and masking.
//!
//! Captured command output is stored in the state directory and shown in
//! run reports, so values of secret-looking environment variables are
//! replaced before either happens.
//!
//! - [`SecretMatcher`] - Matches environment variable names against secret patterns
//! - [`OutputMasker`] - Masks secret values in captured output
//!
//! # Example
//!
//! ```
//! use gantry::secrets::{SecretMatcher, OutputMasker};
//!
//! let matcher = SecretMatcher::with_builtins();
//! assert!(matcher.is_secret("ARM_CLIENT_SECRET"));
//! assert!(!matcher.is_secret("PATH"));
//!
//! let mut masker = OutputMasker::new();
//! masker.add_secret("hunter2");
//! assert_eq!(masker.mask("password=hunter2"), "password=[REDACTED]");
//! ```

pub mod mask;
pub mod pattern;

pub use mask::OutputMasker;
pub use pattern::{SecretMatcher, BUILTIN_PATTERNS};
