//! Plain equality checks guarding destructive actions and clan access.
//! There is no hashing, lockout or rate limiting here.

use crate::error::{ClanError, Result};

/// The configured secret for delete, clear and replace-on-import.
#[derive(Clone, Default)]
pub struct SecretKey(Option<String>);

impl SecretKey {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.filter(|s| !s.is_empty()))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    pub fn verify(&self, provided: Option<&str>) -> Result<()> {
        let Some(expected) = self.0.as_deref() else {
            return Err(ClanError::Auth("secret key is not configured".to_string()));
        };
        match provided {
            Some(value) if value == expected => Ok(()),
            _ => Err(ClanError::Auth("invalid secret key".to_string())),
        }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_configured() { "set" } else { "unset" };
        f.debug_tuple("SecretKey").field(&state).finish()
    }
}

pub fn verify_pin(expected: &str, provided: &str) -> Result<()> {
    if expected == provided {
        Ok(())
    } else {
        Err(ClanError::Auth("invalid PIN".to_string()))
    }
}
