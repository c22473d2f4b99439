use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

const OFFLINE_NAME_MAX: usize = 16;

/// Opaque credential handed over by the authentication collaborator.
/// Resolution only cares whether a token is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub access_token: String,
}

impl Credential {
    /// Token-less credential for offline play.
    pub fn offline(username: &str) -> LauncherResult<Self> {
        let username = username.trim();
        let length = username.chars().count();
        if length == 0 || length > OFFLINE_NAME_MAX {
            return Err(LauncherError::Config(format!(
                "offline username must be 1 to {OFFLINE_NAME_MAX} characters, got {length}"
            )));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            display_name: username.to_string(),
            access_token: String::new(),
        })
    }

    pub fn has_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}
