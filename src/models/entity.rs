use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{genre::parse_descriptors, EntityKind, Genre, GenreDescriptor};

/// Freshness window applied to newly created entities (1 day)
pub const DEFAULT_CACHE_TTL: i64 = 86_400;

/// Locally cached snapshot of a provider movie or TV show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheableEntity {
    pub kind: EntityKind,
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    /// Only populated for TV shows
    pub first_air_date: Option<NaiveDate>,
    /// Associated genres, sorted by provider id
    pub genres: Vec<Genre>,
    pub cached_at: DateTime<Utc>,
    /// Freshness window in seconds
    pub cache_ttl: i64,
}

impl CacheableEntity {
    /// Builds a fresh record from a first successful fetch. Missing text falls back to an
    /// empty title and `None` for the optional fields.
    pub fn from_details(
        kind: EntityKind,
        tmdb_id: i64,
        details: &EntityDetails,
        cache_ttl: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            tmdb_id,
            title: details.title.clone().unwrap_or_default(),
            overview: details.overview.clone(),
            poster_path: details.poster_path.clone(),
            first_air_date: details.first_air_date,
            genres: Vec::new(),
            cached_at: now,
            cache_ttl,
        }
    }

    /// Whether the snapshot is still inside its freshness window at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.cached_at).num_seconds() < self.cache_ttl
    }

    /// Overwrites the fields the provider supplied a value for and stamps `cached_at`.
    /// Fields the provider omitted keep their cached value.
    pub fn merge(&mut self, details: &EntityDetails, now: DateTime<Utc>) {
        if let Some(title) = &details.title {
            self.title = title.clone();
        }
        if let Some(overview) = &details.overview {
            self.overview = Some(overview.clone());
        }
        if let Some(poster_path) = &details.poster_path {
            self.poster_path = Some(poster_path.clone());
        }
        if let Some(first_air_date) = details.first_air_date {
            self.first_air_date = Some(first_air_date);
        }
        self.cached_at = now;
    }
}

/// The subset of a provider detail payload the cache keeps. Each field is `None` when the
/// provider omitted it, sent `null`, or sent an empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDetails {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub genres: Vec<GenreDescriptor>,
}

impl EntityDetails {
    pub fn from_payload(kind: EntityKind, payload: &Value) -> Self {
        let first_air_date = match kind {
            EntityKind::TvShow => non_empty_text(payload, "first_air_date")
                .and_then(|date| NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()),
            EntityKind::Movie => None,
        };

        Self {
            title: non_empty_text(payload, kind.title_field()),
            overview: non_empty_text(payload, "overview"),
            poster_path: non_empty_text(payload, "poster_path"),
            first_air_date,
            genres: parse_descriptors(payload.get("genres")),
        }
    }
}

fn non_empty_text(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}
