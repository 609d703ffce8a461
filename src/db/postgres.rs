use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{CacheableEntity, EntityKind, Genre, GenreDescriptor},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// [`CatalogStore`] backed by PostgreSQL
///
/// Uniqueness per `(kind, tmdb_id)` comes from the table's primary key, so concurrent
/// creates for the same id collapse into one row.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the migrations/ directory
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_entity(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> AppResult<Option<CacheableEntity>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT kind, tmdb_id, title, overview, poster_path, first_air_date, cached_at, cache_ttl
            FROM catalog_entities
            WHERE kind = $1 AND tmdb_id = $2
            "#,
        )
        .bind(kind.as_str())
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let genres = sqlx::query_as::<_, GenreRow>(
            r#"
            SELECT g.tmdb_id, g.name
            FROM genres g
            JOIN catalog_entity_genres eg ON eg.genre_id = g.tmdb_id
            WHERE eg.kind = $1 AND eg.tmdb_id = $2
            ORDER BY g.tmdb_id
            "#,
        )
        .bind(kind.as_str())
        .bind(tmdb_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entity = CacheableEntity::try_from(row)?;
        entity.genres = genres.into_iter().map(Into::into).collect();
        Ok(Some(entity))
    }

    async fn insert_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Option<Vec<Genre>>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO catalog_entities
                (kind, tmdb_id, title, overview, poster_path, first_air_date, cached_at, cache_ttl)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (kind, tmdb_id) DO NOTHING
            "#,
        )
        .bind(entity.kind.as_str())
        .bind(entity.tmdb_id)
        .bind(&entity.title)
        .bind(&entity.overview)
        .bind(&entity.poster_path)
        .bind(entity.first_air_date)
        .bind(entity.cached_at)
        .bind(entity.cache_ttl)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stored = write_genres(&mut tx, entity.kind, entity.tmdb_id, genres).await?;
        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn update_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE catalog_entities
            SET title = $3, overview = $4, poster_path = $5, first_air_date = $6,
                cached_at = $7, cache_ttl = $8
            WHERE kind = $1 AND tmdb_id = $2
            "#,
        )
        .bind(entity.kind.as_str())
        .bind(entity.tmdb_id)
        .bind(&entity.title)
        .bind(&entity.overview)
        .bind(&entity.poster_path)
        .bind(entity.first_air_date)
        .bind(entity.cached_at)
        .bind(entity.cache_ttl)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(not_cached(entity.kind, entity.tmdb_id));
        }

        let stored = if genres.is_empty() {
            genres_of(&mut tx, entity.kind, entity.tmdb_id).await?
        } else {
            write_genres(&mut tx, entity.kind, entity.tmdb_id, genres).await?
        };

        tx.commit().await?;
        Ok(stored)
    }

    async fn ensure_genre(&self, descriptor: &GenreDescriptor) -> AppResult<Genre> {
        let mut conn = self.pool.acquire().await?;
        upsert_genre(&mut conn, descriptor).await
    }

    async fn replace_genres(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the entity; also rejects unknown ids before any genre is written
        let exists = sqlx::query(
            "SELECT 1 FROM catalog_entities WHERE kind = $1 AND tmdb_id = $2 FOR UPDATE",
        )
        .bind(kind.as_str())
        .bind(tmdb_id)
        .fetch_optional(&mut *tx)
        .await?;

        if exists.is_none() {
            tx.rollback().await?;
            return Err(not_cached(kind, tmdb_id));
        }

        let stored = write_genres(&mut tx, kind, tmdb_id, genres).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        let rows = sqlx::query_as::<_, GenreRow>("SELECT tmdb_id, name FROM genres ORDER BY tmdb_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn not_cached(kind: EntityKind, tmdb_id: i64) -> AppError {
    AppError::NotFound(format!("{} {} is not cached", kind, tmdb_id))
}

/// Creates the genre if unknown and returns the stored row
async fn upsert_genre(conn: &mut PgConnection, descriptor: &GenreDescriptor) -> AppResult<Genre> {
    // The no-op update makes RETURNING yield the stored row on conflict
    let row = sqlx::query_as::<_, GenreRow>(
        r#"
        INSERT INTO genres (tmdb_id, name)
        VALUES ($1, $2)
        ON CONFLICT (tmdb_id) DO UPDATE SET name = genres.name
        RETURNING tmdb_id, name
        "#,
    )
    .bind(descriptor.id)
    .bind(&descriptor.name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

async fn genres_of(conn: &mut PgConnection, kind: EntityKind, tmdb_id: i64) -> AppResult<Vec<Genre>> {
    let rows = sqlx::query_as::<_, GenreRow>(
        r#"
        SELECT g.tmdb_id, g.name
        FROM genres g
        JOIN catalog_entity_genres eg ON eg.genre_id = g.tmdb_id
        WHERE eg.kind = $1 AND eg.tmdb_id = $2
        ORDER BY g.tmdb_id
        "#,
    )
    .bind(kind.as_str())
    .bind(tmdb_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Ensures every descriptor's genre and replaces the entity's association rows with exactly
/// that set. Runs on the caller's transaction.
async fn write_genres(
    conn: &mut PgConnection,
    kind: EntityKind,
    tmdb_id: i64,
    descriptors: &[GenreDescriptor],
) -> AppResult<Vec<Genre>> {
    let mut genre_ids: Vec<i64> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        genre_ids.push(upsert_genre(conn, descriptor).await?.tmdb_id);
    }

    sqlx::query("DELETE FROM catalog_entity_genres WHERE kind = $1 AND tmdb_id = $2")
        .bind(kind.as_str())
        .bind(tmdb_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO catalog_entity_genres (kind, tmdb_id, genre_id)
        SELECT $1, $2, UNNEST($3::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(kind.as_str())
    .bind(tmdb_id)
    .bind(&genre_ids)
    .execute(&mut *conn)
    .await?;

    genres_of(conn, kind, tmdb_id).await
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct EntityRow {
    kind: String,
    tmdb_id: i64,
    title: String,
    overview: Option<String>,
    poster_path: Option<String>,
    first_air_date: Option<NaiveDate>,
    cached_at: DateTime<Utc>,
    cache_ttl: i64,
}

impl TryFrom<EntityRow> for CacheableEntity {
    type Error = AppError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse::<EntityKind>().map_err(AppError::Internal)?;

        Ok(CacheableEntity {
            kind,
            tmdb_id: row.tmdb_id,
            title: row.title,
            overview: row.overview,
            poster_path: row.poster_path,
            first_air_date: row.first_air_date,
            genres: Vec::new(),
            cached_at: row.cached_at,
            cache_ttl: row.cache_ttl,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GenreRow {
    tmdb_id: i64,
    name: String,
}

impl From<GenreRow> for Genre {
    fn from(row: GenreRow) -> Self {
        Genre {
            tmdb_id: row.tmdb_id,
            name: row.name,
        }
    }
}
