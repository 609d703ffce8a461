use serde::{Deserialize, Serialize};

/// A genre as delivered by the provider, e.g. `{"id": 18, "name": "Drama"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDescriptor {
    pub id: i64,
    pub name: String,
}

impl GenreDescriptor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Locally stored genre record, shared by every entity that references it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub tmdb_id: i64,
    pub name: String,
}

impl From<&GenreDescriptor> for Genre {
    fn from(descriptor: &GenreDescriptor) -> Self {
        Self {
            tmdb_id: descriptor.id,
            name: descriptor.name.clone(),
        }
    }
}

/// Parses a provider `genres` array, skipping entries without a usable id or name
pub fn parse_descriptors(value: Option<&serde_json::Value>) -> Vec<GenreDescriptor> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|genre| serde_json::from_value(genre.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_descriptors() {
        let payload = json!({
            "genres": [
                {"id": 18, "name": "Drama"},
                {"id": 53, "name": "Thriller"}
            ]
        });

        let genres = parse_descriptors(payload.get("genres"));
        assert_eq!(
            genres,
            vec![
                GenreDescriptor::new(18, "Drama"),
                GenreDescriptor::new(53, "Thriller")
            ]
        );
    }

    #[test]
    fn test_parse_descriptors_skips_malformed_entries() {
        let payload = json!({
            "genres": [{"id": "oops"}, {"name": "No Id"}, {"id": 35, "name": "Comedy"}]
        });

        let genres = parse_descriptors(payload.get("genres"));
        assert_eq!(genres, vec![GenreDescriptor::new(35, "Comedy")]);
    }

    #[test]
    fn test_parse_descriptors_missing_key() {
        assert!(parse_descriptors(None).is_empty());
        assert!(parse_descriptors(Some(&json!("not a list"))).is_empty());
    }
}
