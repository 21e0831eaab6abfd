//! User credentials file: a token and its seed in one text block that
//! client libraries accept as-is.

use std::fmt;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

const JWT_BEGIN: &str = "-----BEGIN NATS USER JWT-----";
const JWT_END: &str = "------END NATS USER JWT------";
const SEED_BEGIN: &str = "-----BEGIN USER NKEY SEED-----";
const SEED_END: &str = "------END USER NKEY SEED------";

const NOTICE: &str = "************************* IMPORTANT *************************\n\
NKEY Seed printed below can be used to sign and prove identity.\n\
NKEYs are sensitive and should be treated as secrets.";
const FOOTER: &str = "*************************************************************";

/// A user token together with the seed that proves ownership of it.
#[derive(Clone)]
pub struct UserCredentials {
    pub jwt: String,
    pub seed: Zeroizing<String>,
}

impl UserCredentials {
    pub fn new(jwt: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            seed: Zeroizing::new(seed.into()),
        }
    }

    /// Render the credentials file.
    pub fn render(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{JWT_BEGIN}\n{jwt}\n{JWT_END}\n\n{NOTICE}\n\n{SEED_BEGIN}\n{seed}\n{SEED_END}\n\n{FOOTER}\n",
            jwt = self.jwt,
            seed = self.seed.as_str(),
        ))
    }

    /// Parse a credentials file, extracting the token and seed sections.
    pub fn parse(text: &str) -> Result<Self> {
        let jwt = section(text, JWT_BEGIN, JWT_END)
            .ok_or_else(|| CoreError::MalformedCredentials("missing user JWT section".into()))?;
        let seed = section(text, SEED_BEGIN, SEED_END)
            .ok_or_else(|| CoreError::MalformedCredentials("missing seed section".into()))?;
        Ok(Self::new(jwt, seed))
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("jwt", &self.jwt)
            .field("seed", &"<redacted>")
            .finish()
    }
}

fn section<'a>(text: &'a str, begin: &str, end: &str) -> Option<&'a str> {
    let start = text.find(begin)? + begin.len();
    let len = text[start..].find(end)?;
    let body = text[start..start + len].trim();
    (!body.is_empty()).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout() {
        let creds = UserCredentials::new("eyJhbGc.payload.sig", "SUAEXAMPLESEED");
        let text = creds.render();

        assert!(text.starts_with("-----BEGIN NATS USER JWT-----\neyJhbGc.payload.sig\n"));
        assert!(text.contains("\n------END NATS USER JWT------\n\n*****"));
        assert!(text.contains("-----BEGIN USER NKEY SEED-----\nSUAEXAMPLESEED\n------END USER NKEY SEED------\n"));
        assert!(text.ends_with("*************************************************************\n"));
    }

    #[test]
    fn test_parse_rendered() {
        let creds = UserCredentials::new("a.b.c", "SUSEED");
        let parsed = UserCredentials::parse(&creds.render()).unwrap();
        assert_eq!(parsed.jwt, "a.b.c");
        assert_eq!(parsed.seed.as_str(), "SUSEED");
    }

    #[test]
    fn test_parse_missing_section() {
        let err = UserCredentials::parse("-----BEGIN NATS USER JWT-----\na.b.c\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedCredentials(_)));
    }

    #[test]
    fn test_debug_redacts_seed() {
        let creds = UserCredentials::new("a.b.c", "SUSECRET");
        assert!(!format!("{creds:?}").contains("SUSECRET"));
    }
}
