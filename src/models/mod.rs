use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Display, str::FromStr};

pub mod entity;
pub mod genre;

pub use entity::{CacheableEntity, EntityDetails, DEFAULT_CACHE_TTL};
pub use genre::{Genre, GenreDescriptor};

/// The two cacheable entity kinds the provider serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tv")]
    TvShow,
}

impl EntityKind {
    /// Path segment used by the provider API (`/movie/550`, `/tv/1396`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Movie => "movie",
            EntityKind::TvShow => "tv",
        }
    }

    /// Payload field holding the display title
    pub fn title_field(&self) -> &'static str {
        match self {
            EntityKind::Movie => "title",
            EntityKind::TvShow => "name",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" | "movies" => Ok(EntityKind::Movie),
            "tv" | "tv_show" | "tvshow" => Ok(EntityKind::TvShow),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

// ============================================================================
// Provider list payloads
// ============================================================================

/// Extracts the list under `key` from a provider response. A missing key or a non-array
/// value yields an empty list.
pub fn list_field(payload: &Value, key: &str) -> Vec<Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Provider id of a list entry, if it carries one
pub fn payload_id(payload: &Value) -> Option<i64> {
    payload.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(format!("{}", EntityKind::Movie), "movie");
        assert_eq!(format!("{}", EntityKind::TvShow), "tv");
    }

    #[test]
    fn test_entity_kind_serde() {
        let json = serde_json::to_string(&EntityKind::TvShow).unwrap();
        assert_eq!(json, r#""tv""#);

        let deserialized: EntityKind = serde_json::from_str(r#""movie""#).unwrap();
        assert_eq!(deserialized, EntityKind::Movie);
    }

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("movies".parse::<EntityKind>(), Ok(EntityKind::Movie));
        assert_eq!("TV".parse::<EntityKind>(), Ok(EntityKind::TvShow));
        assert!("anime".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_list_field_defaults_to_empty() {
        let payload = json!({"page": 1, "results": [{"id": 550}, {"id": 680}]});
        assert_eq!(list_field(&payload, "results").len(), 2);
        assert!(list_field(&payload, "genres").is_empty());
        assert!(list_field(&json!({"results": null}), "results").is_empty());
    }

    #[test]
    fn test_payload_id() {
        assert_eq!(payload_id(&json!({"id": 550, "title": "Fight Club"})), Some(550));
        assert_eq!(payload_id(&json!({"title": "No id"})), None);
    }
}
