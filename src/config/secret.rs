//! Secret values that never leave the process in readable form.

use serde::{Deserialize, Serialize, Serializer};

/// Placeholder written wherever a secret would otherwise be shown.
pub const REDACTED: &str = "<secret>";

/// A credential loaded from the configuration file.
///
/// `Debug`, `Display` and serialization all print [`REDACTED`]; only
/// [`Secret::expose`] returns the underlying value, and it is used solely when
/// building outbound request headers.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted_in_every_representation() {
        let secret = Secret::new("syt_access_token_value");

        let representations = [
            format!("{:?}", secret),
            format!("{}", secret),
            format!("{:?}", Some(&secret)),
            serde_json::to_string(&secret).unwrap(),
            serde_yml::to_string(&secret).unwrap(),
        ];

        for repr in &representations {
            assert!(!repr.contains("syt_access_token_value"), "leaked: {repr}");
            assert!(repr.contains(REDACTED));
        }
        assert_eq!(secret.expose(), "syt_access_token_value");
    }

    #[test]
    fn secret_deserializes_from_a_plain_string() {
        let secret: Secret = serde_yml::from_str("hunter2").unwrap();
        assert_eq!(secret.expose(), "hunter2");
    }
}
