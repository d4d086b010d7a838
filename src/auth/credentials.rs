//! Configured login users with SHA-256 password digests

use super::{AuthError, Identity};
use crate::config::UserCredential;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    /// Keyed by lowercase email
    users: HashMap<String, UserCredential>,
}

impl CredentialStore {
    pub fn new(users: &[UserCredential]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.email.to_lowercase(), u.clone()))
                .collect(),
        }
    }

    pub fn hash_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    pub fn verify(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let Some(user) = self.users.get(&email.to_lowercase()) else {
            debug!("Login attempt for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        let supplied = Self::hash_password(password);
        if !digests_match(&supplied, &user.password_sha256.to_lowercase()) {
            debug!(user_id = %user.id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Identity {
            id: user.id.clone(),
            email: user.email.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Comparison time does not depend on where the digests differ
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
