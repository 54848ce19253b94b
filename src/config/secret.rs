//! Secret string wrapper for sensitive data.

use std::fmt;

/// A wrapper for sensitive strings that redacts the value in Debug/Display
/// output.
///
/// The Anthropic API key is held in this type so that logging a
/// configuration struct can never leak it.
///
/// # Example
///
/// ```
/// use retention_reasoning::config::SecretString;
///
/// let key = SecretString::new("sk-ant-api03-example");
/// assert_eq!(format!("{key:?}"), "<REDACTED>");
/// assert_eq!(key.expose(), "sk-ant-api03-example");
/// ```
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a sensitive value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the underlying secret.
    ///
    /// Call this only at the point of use (request headers).
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expose_returns_original() {
        let secret = SecretString::new("sk-ant-key");
        assert_eq!(secret.expose(), "sk-ant-key");
    }

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = SecretString::new("very-secret");
        assert_eq!(format!("{secret:?}"), "<REDACTED>");
        assert_eq!(format!("{secret}"), "<REDACTED>");
    }

    #[test]
    fn test_eq_compares_values() {
        assert_eq!(SecretString::new("a"), SecretString::new("a"));
        assert_ne!(SecretString::new("a"), SecretString::new("b"));
    }

    #[test]
    fn test_is_empty() {
        assert!(SecretString::new("").is_empty());
        assert!(!SecretString::new("k").is_empty());
    }

    #[test]
    fn test_from_conversions() {
        let from_str: SecretString = "k1".into();
        let from_string: SecretString = String::from("k2").into();
        assert_eq!(from_str.expose(), "k1");
        assert_eq!(from_string.expose(), "k2");
    }
}
