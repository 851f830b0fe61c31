//! Secret-looking environment variable names.

use regex::RegexSet;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Built-in name patterns, as (label, regex).
pub const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("api_key", r"(?i)^.*_?(API_?KEY|APIKEY)$"),
    ("secret", r"(?i)^.*_?(SECRET|SECRET_KEY)$"),
    ("token", r"(?i)^.*_?(TOKEN|ACCESS_TOKEN|AUTH_TOKEN)$"),
    ("password", r"(?i)^.*_?(PASSWORD|PASSWD|PWD)$"),
    ("credential", r"(?i)^.*_?CREDENTIALS?$"),
    ("private_key", r"(?i)^.*_?PRIVATE_KEY$"),
    ("access_key", r"(?i)^.*_?ACCESS_KEY$"),
    ("connection_string", r"(?i)^.*(CONNECTION_STRING|DATABASE_URL)$"),
];

static BUILTINS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(BUILTIN_PATTERNS.iter().map(|(_, pattern)| *pattern))
        .expect("builtin secret patterns are valid")
});

/// Decides which environment variables hold secrets.
///
/// A name is secret when it matches a built-in pattern or equals one of
/// the configured `settings.secret_env` names.
///
/// # Example
///
/// ```
/// use gantry::secrets::SecretMatcher;
///
/// let matcher = SecretMatcher::with_builtins_and_custom(&["KUBE_DATA".to_string()]);
///
/// assert!(matcher.is_secret("ARM_ACCESS_KEY"));
/// assert!(matcher.is_secret("KUBE_DATA"));
/// assert!(!matcher.is_secret("RESOURCE_GROUP"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SecretMatcher {
    exact: HashSet<String>,
}

impl SecretMatcher {
    /// Built-in patterns only.
    pub fn with_builtins() -> Self {
        Self::default()
    }

    /// Built-in patterns plus exact, case-sensitive names.
    pub fn with_builtins_and_custom(custom_names: &[String]) -> Self {
        Self {
            exact: custom_names.iter().cloned().collect(),
        }
    }

    /// Whether `env_name` should have its value masked.
    pub fn is_secret(&self, env_name: &str) -> bool {
        self.exact.contains(env_name) || BUILTINS.is_match(env_name)
    }

    /// Labels of the built-in patterns `env_name` matches.
    pub fn matching_patterns(&self, env_name: &str) -> Vec<&'static str> {
        BUILTINS
            .matches(env_name)
            .into_iter()
            .map(|i| BUILTIN_PATTERNS[i].0)
            .collect()
    }
}
