use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Kind of thing a user can endorse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Brand,
    Business,
    Place,
    Value,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Brand,
        EntityType::Business,
        EntityType::Place,
        EntityType::Value,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Brand => "brand",
            EntityType::Business => "business",
            EntityType::Place => "place",
            EntityType::Value => "value",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand" => Ok(EntityType::Brand),
            "business" => Ok(EntityType::Business),
            "place" => Ok(EntityType::Place),
            "value" => Ok(EntityType::Value),
            other => Err(CoreError::InvalidEntityType(other.to_string())),
        }
    }
}

/// Identity of one endorsement history: a user's relationship with one entity.
///
/// Mutations are serialised per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl HistoryKey {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.entity_type, self.entity_id)
    }
}
