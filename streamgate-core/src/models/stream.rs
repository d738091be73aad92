use serde::{Deserialize, Serialize};

/// Provider-assigned stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u32);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lightweight stream descriptor carried in route-observer notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub name: String,
}

impl StreamInfo {
    #[must_use]
    pub fn new(id: StreamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
