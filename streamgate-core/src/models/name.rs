use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Composed application name in the form `#<vhost>#<app>`.
///
/// `#` characters inside the raw vhost/app tokens are replaced with `_`
/// before composition, so the composed form always splits into exactly
/// three tokens with an empty first token. Third parties that carry this
/// string around must parse it accordingly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VHostAppName(String);

impl VHostAppName {
    /// Compose a name from raw vhost and application tokens.
    #[must_use]
    pub fn resolve(vhost_name: &str, app_name: &str) -> Self {
        Self(format!(
            "#{}#{}",
            vhost_name.replace('#', "_"),
            app_name.replace('#', "_")
        ))
    }

    /// Parse a composed name. Valid iff splitting on `#` yields exactly
    /// three tokens with the first empty.
    pub fn parse(name: &str) -> Result<Self> {
        let tokens: Vec<&str> = name.split('#').collect();
        if tokens.len() == 3 && tokens[0].is_empty() {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidName(name.to_string()))
        }
    }

    #[must_use]
    pub fn vhost_name(&self) -> &str {
        // Valid by construction: "#<vhost>#<app>"
        self.0.split('#').nth(1).unwrap_or("")
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        self.0.split('#').nth(2).unwrap_or("")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VHostAppName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
