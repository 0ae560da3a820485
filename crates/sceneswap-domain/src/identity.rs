//! Credential verification and identity resolution.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// A verified identity, derived once per request from a credential.
///
/// The subject is used for client-side display and for deriving the
/// entitlement key; it is never persisted in raw form and never trusted
/// beyond the request that resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

/// Errors from credential handling.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// No credential was supplied. Produced by callers that extract the
    /// token from the request, never by the resolver itself.
    #[error("missing credential")]
    Missing,

    /// The credential is malformed, carries a bad signature, or has expired.
    #[error("invalid or expired credential: {reason}")]
    Invalid { reason: String },
}

#[derive(Debug, Deserialize)]
struct Claims {
    email: Option<String>,
    sub: Option<String>,
}

/// Verifies bearer credentials and extracts a stable subject.
///
/// Pure verification with no side effects: HS256 signature plus expiry
/// check. The subject is the `email` claim when present, `sub` otherwise.
pub struct IdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl IdentityResolver {
    /// Creates a resolver for tokens signed with the given shared secret.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies `token` and extracts the identity it asserts.
    pub fn resolve(&self, token: &str) -> Result<Identity, CredentialError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            CredentialError::Invalid {
                reason: e.to_string(),
            }
        })?;

        let subject = data
            .claims
            .email
            .or(data.claims.sub)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CredentialError::Invalid {
                reason: "token carries no subject claim".to_string(),
            })?;

        Ok(Identity { subject })
    }
}
