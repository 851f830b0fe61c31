//! Output masking for secret values.

use regex::Regex;
use std::collections::HashMap;

use super::SecretMatcher;

const MASK: &str = "[REDACTED]";

/// Replaces secret values in captured output with `[REDACTED]`.
///
/// # Example
///
/// ```
/// use gantry::secrets::OutputMasker;
///
/// let mut masker = OutputMasker::new();
/// masker.add_secret("super-secret-value");
///
/// let output = masker.mask("The key is super-secret-value here");
/// assert_eq!(output, "The key is [REDACTED] here");
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutputMasker {
    secrets: Vec<String>,
    // Alternation of every secret, longest first.
    matcher: Option<Regex>,
}

impl OutputMasker {
    /// A masker with no secrets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret value. Empty strings and duplicates are ignored.
    pub fn add_secret(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.secrets.contains(&value) {
            return;
        }
        self.secrets.push(value);
        self.secrets.sort_by(|a, b| b.len().cmp(&a.len()));

        let alternation = self
            .secrets
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        self.matcher = match Regex::new(&alternation) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "secret alternation too large; masking one by one");
                None
            }
        };
    }

    /// Register the value of every secret-named variable in `env`.
    pub fn add_env(&mut self, env: &HashMap<String, String>, matcher: &SecretMatcher) {
        for (name, value) in env {
            if matcher.is_secret(name) {
                self.add_secret(value.clone());
            }
        }
    }

    /// Mask every registered secret in `input`.
    pub fn mask(&self, input: &str) -> String {
        match &self.matcher {
            Some(regex) => regex.replace_all(input, MASK).into_owned(),
            None => self
                .secrets
                .iter()
                .fold(input.to_string(), |text, secret| text.replace(secret.as_str(), MASK)),
        }
    }

    /// Number of registered secrets.
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_multiple_secrets() {
        let mut masker = OutputMasker::new();
        masker.add_secret("secret1");
        masker.add_secret("secret2");

        let output = masker.mask("Values: secret1 and secret2");

        assert_eq!(output, "Values: [REDACTED] and [REDACTED]");
    }

    #[test]
    fn ignores_empty_and_duplicate_secrets() {
        let mut masker = OutputMasker::new();
        masker.add_secret("");
        masker.add_secret("real-secret");
        masker.add_secret("real-secret");

        assert_eq!(masker.secret_count(), 1);
        assert_eq!(masker.mask("The real-secret is here"), "The [REDACTED] is here");
    }

    #[test]
    fn longer_secret_wins_on_overlap() {
        let mut masker = OutputMasker::new();
        masker.add_secret("abc");
        masker.add_secret("abcdef");

        assert_eq!(masker.mask("token=abcdef abc"), "token=[REDACTED] [REDACTED]");
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let mut masker = OutputMasker::new();
        masker.add_secret("p@ss.w*rd(1)");

        assert_eq!(masker.mask("pw=p@ss.w*rd(1)"), "pw=[REDACTED]");
        assert_eq!(masker.mask("pw=p@ssXwrd1"), "pw=p@ssXwrd1");
    }

    #[test]
    fn add_env_only_registers_secret_names() {
        let env = HashMap::from([
            ("ARM_CLIENT_SECRET".to_string(), "s3cr3t".to_string()),
            ("RESOURCE_GROUP".to_string(), "rg-demo".to_string()),
        ]);
        let mut masker = OutputMasker::new();

        masker.add_env(&env, &SecretMatcher::with_builtins());

        assert_eq!(masker.secret_count(), 1);
        assert_eq!(
            masker.mask("login s3cr3t into rg-demo"),
            "login [REDACTED] into rg-demo"
        );
    }
}
