//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{BlobRow, RecordRow};
use crate::repos::{BlobRepo, RecordRepo};
use async_trait::async_trait;
use granary_core::{ArtifactKind, CanonicalKey};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: RecordRepo + BlobRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent lock failures under concurrent handlers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordRepo for SqliteStore {
    async fn insert_record(&self, record: &RecordRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (
                id, publisher, package, version, kind,
                title, description, authors, maintainer, dependencies, built, extra,
                file_key, file_length, file_sha256, file_md5, filename,
                commit_json, jobs, stats, registered, status, distro, upstream, build_url,
                score, indexed, universes, owner, self_owned,
                previous_version, index_url, arch, platform_major,
                created_at, published_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.publisher)
        .bind(&record.package)
        .bind(&record.version)
        .bind(&record.kind)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.authors)
        .bind(&record.maintainer)
        .bind(&record.dependencies)
        .bind(&record.built)
        .bind(&record.extra)
        .bind(&record.file_key)
        .bind(record.file_length)
        .bind(&record.file_sha256)
        .bind(&record.file_md5)
        .bind(&record.filename)
        .bind(&record.commit_json)
        .bind(&record.jobs)
        .bind(&record.stats)
        .bind(record.registered)
        .bind(&record.status)
        .bind(&record.distro)
        .bind(&record.upstream)
        .bind(&record.build_url)
        .bind(record.score)
        .bind(record.indexed)
        .bind(&record.universes)
        .bind(&record.owner)
        .bind(record.self_owned)
        .bind(&record.previous_version)
        .bind(&record.index_url)
        .bind(&record.arch)
        .bind(&record.platform_major)
        .bind(record.created_at)
        .bind(record.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_record(
        &self,
        publisher: &str,
        package: &str,
        version: &str,
        kind: &str,
    ) -> MetadataResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE publisher = ? AND package = ? AND version = ? AND kind = ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(publisher)
        .bind(package)
        .bind(version)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_records(&self, publisher: &str, package: &str) -> MetadataResult<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE publisher = ? AND package = ? ORDER BY kind, created_at",
        )
        .bind(publisher)
        .bind(package)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_canonical(&self, key: &CanonicalKey) -> MetadataResult<Vec<RecordRow>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM records WHERE publisher = ");
        qb.push_bind(&key.user);
        qb.push(" AND kind = ");
        qb.push_bind(key.kind.as_str());
        qb.push(" AND package = ");
        qb.push_bind(&key.package);

        if key.kind.is_binary() {
            match &key.platform_major {
                Some(v) => {
                    qb.push(" AND platform_major = ");
                    qb.push_bind(v);
                }
                None => {
                    qb.push(" AND platform_major IS NULL");
                }
            }
            // An unknown architecture competes with every architecture.
            if let Some(arch) = &key.arch {
                qb.push(" AND arch = ");
                qb.push_bind(arch);
            }
            if key.kind == ArtifactKind::Linux {
                match &key.distro {
                    Some(v) => {
                        qb.push(" AND distro = ");
                        qb.push_bind(v);
                    }
                    None => {
                        qb.push(" AND distro IS NULL");
                    }
                }
            }
        }
        qb.push(" ORDER BY created_at");

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_record(&self, id: Uuid) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("record {id} not found")));
        }
        Ok(())
    }

    async fn count_records_with_file(&self, file_key: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE file_key = ?")
            .bind(file_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn find_failure(
        &self,
        publisher: &str,
        package: &str,
    ) -> MetadataResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE publisher = ? AND package = ? AND kind = 'failure' LIMIT 1",
        )
        .bind(publisher)
        .bind(package)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_dependents(&self, package: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM records
            WHERE kind = 'src'
              AND EXISTS (
                SELECT 1 FROM json_each(records.dependencies)
                WHERE json_extract(json_each.value, '$.package') = ?
              )
            "#,
        )
        .bind(package)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn deindex_record(&self, id: Uuid, index_url: &str) -> MetadataResult<()> {
        let result =
            sqlx::query("UPDATE records SET indexed = 0, index_url = ? WHERE id = ?")
                .bind(index_url)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("record {id} not found")));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: &str,
        build_url: Option<&str>,
    ) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE records SET status = ?, build_url = COALESCE(?, build_url) WHERE id = ?",
        )
        .bind(status)
        .bind(build_url)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("record {id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobRepo for SqliteStore {
    async fn insert_blob(&self, blob: &BlobRow) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO blobs (key, length, filename, sha256, md5, uploader, commit_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&blob.key)
        .bind(blob.length)
        .bind(&blob.filename)
        .bind(&blob.sha256)
        .bind(&blob.md5)
        .bind(&blob.uploader)
        .bind(&blob.commit_id)
        .bind(blob.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_blob(&self, key: &str) -> MetadataResult<Option<BlobRow>> {
        let row = sqlx::query_as::<_, BlobRow>("SELECT * FROM blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_blob(&self, key: &str) -> MetadataResult<()> {
        sqlx::query("DELETE FROM blobs WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_unreferenced_blobs(&self, limit: u32) -> MetadataResult<Vec<BlobRow>> {
        let rows = sqlx::query_as::<_, BlobRow>(
            r#"
            SELECT * FROM blobs
            WHERE NOT EXISTS (SELECT 1 FROM records WHERE records.file_key = blobs.key)
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    publisher TEXT NOT NULL,
    package TEXT NOT NULL,
    version TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT,
    description TEXT,
    authors TEXT,
    maintainer TEXT NOT NULL,
    dependencies TEXT NOT NULL,
    built TEXT,
    extra TEXT NOT NULL,
    file_key TEXT,
    file_length INTEGER,
    file_sha256 TEXT,
    file_md5 TEXT,
    filename TEXT,
    commit_json TEXT NOT NULL,
    jobs TEXT NOT NULL,
    stats TEXT NOT NULL,
    registered INTEGER,
    status TEXT,
    distro TEXT,
    upstream TEXT,
    build_url TEXT,
    score REAL NOT NULL DEFAULT 1.0,
    indexed INTEGER NOT NULL DEFAULT 0,
    universes TEXT NOT NULL,
    owner TEXT,
    self_owned INTEGER NOT NULL DEFAULT 0,
    previous_version TEXT,
    index_url TEXT,
    arch TEXT,
    platform_major TEXT,
    created_at TEXT NOT NULL,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_canonical
    ON records (publisher, kind, package);
CREATE INDEX IF NOT EXISTS idx_records_file_key
    ON records (file_key);
CREATE INDEX IF NOT EXISTS idx_records_package
    ON records (package);

CREATE TABLE IF NOT EXISTS blobs (
    key TEXT PRIMARY KEY,
    length INTEGER NOT NULL,
    filename TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    md5 TEXT NOT NULL,
    uploader TEXT NOT NULL,
    commit_id TEXT,
    created_at TEXT NOT NULL
);
"#;
