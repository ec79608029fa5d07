//! API key pair.

use std::fmt;

use tracing::warn;

/// Environment variable holding the public half of the key.
pub const PUBLIC_ID_VAR: &str = "NUMERAI_PUBLIC_ID";

/// Environment variable holding the secret half of the key.
pub const SECRET_KEY_VAR: &str = "NUMERAI_SECRET_KEY";

/// A public id and secret key, as generated under Account > Custom API keys.
///
/// `Debug` output never contains the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    public_id: String,
    secret_key: String,
}

impl Credentials {
    /// Credentials from an explicit key pair.
    pub fn new(public_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Read `NUMERAI_PUBLIC_ID` and `NUMERAI_SECRET_KEY`.
    ///
    /// Returns `None` unless both are set. If only one is set a warning is
    /// logged.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Credentials::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let public_id = lookup(PUBLIC_ID_VAR).filter(|v| !v.is_empty());
        let secret_key = lookup(SECRET_KEY_VAR).filter(|v| !v.is_empty());
        match (public_id, secret_key) {
            (Some(public_id), Some(secret_key)) => Some(Self::new(public_id, secret_key)),
            (None, None) => None,
            _ => {
                warn!("You need to supply both a public id and a secret key");
                None
            }
        }
    }

    /// The public half.
    pub fn public_id(&self) -> &str {
        &self.public_id
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Token {}${}", self.public_id, self.secret_key)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_id", &self.public_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn header_format() {
        let creds = Credentials::new("PUB", "SECRET");
        assert_eq!(creds.authorization_header(), "Token PUB$SECRET");
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("PUB", "SECRET");
        let debug = format!("{creds:?}");
        assert!(debug.contains("PUB"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn lookup_requires_both_halves() {
        let both = env(&[(PUBLIC_ID_VAR, "a"), (SECRET_KEY_VAR, "b")]);
        assert_eq!(Credentials::from_lookup(both), Some(Credentials::new("a", "b")));

        assert_eq!(Credentials::from_lookup(env(&[(PUBLIC_ID_VAR, "a")])), None);
        assert_eq!(Credentials::from_lookup(env(&[])), None);
        assert_eq!(
            Credentials::from_lookup(env(&[(PUBLIC_ID_VAR, "a"), (SECRET_KEY_VAR, "")])),
            None
        );
    }
}
