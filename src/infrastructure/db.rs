//! SQLite catalog for template records.
//!
//! The catalog is the durable side of the registry: one row per template,
//! keyed by name, with the parameter schema cache stored inline as JSON.
//! A `template_versions` table records the git hash observed at each
//! provisioning, and `template_dependencies` reserves room for future
//! dependency tracking between templates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use rusqlite_migration::{M, Migrations};
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::types::TemplateRecord;

/// Durable name-keyed store of template records
pub struct Catalog {
    pool: Pool<SqliteConnectionManager>,
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                description TEXT,
                category TEXT,
                tags TEXT,
                env_path TEXT,
                ready INTEGER NOT NULL DEFAULT 0,
                schema_json TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT
            );",
        ),
        M::up(
            "CREATE TABLE template_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id INTEGER,
                version TEXT NOT NULL,
                git_hash TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (template_id) REFERENCES templates (id)
            );",
        ),
        M::up(
            "CREATE TABLE template_dependencies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id INTEGER,
                dependency_id INTEGER,
                optional BOOLEAN DEFAULT 0,
                FOREIGN KEY (template_id) REFERENCES templates (id),
                FOREIGN KEY (dependency_id) REFERENCES templates (id)
            );",
        ),
    ])
}

impl Catalog {
    /// Open (creating and migrating as needed) the catalog at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(4).build(manager)?;

        let mut conn = pool.get()?;
        migrations()
            .to_latest(&mut conn)
            .map_err(|e| Error::Persistence(format!("migration failed: {e}")))?;

        debug!(path = %path.display(), "catalog opened");
        Ok(Self { pool })
    }

    /// Insert or replace the row for `record`, keyed by name.
    pub fn upsert(&self, record: &TemplateRecord) -> Result<()> {
        let schema_json = record
            .parameter_schema_cache
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let env_path = record
            .environment_handle
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO templates (name, url, description, category, tags, env_path, ready, schema_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                description = excluded.description,
                category = excluded.category,
                tags = excluded.tags,
                env_path = excluded.env_path,
                ready = excluded.ready,
                schema_json = excluded.schema_json,
                updated_at = excluded.updated_at",
            params![
                record.name,
                record.source_url,
                record.description,
                record.category,
                serde_json::to_string(&record.tags)?,
                env_path,
                record.ready,
                schema_json,
                record.last_updated.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Delete the row for `name` along with its version history.
    ///
    /// Deleting an unknown name is a no-op; existence is the registry's
    /// responsibility.
    pub fn delete(&self, name: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM template_versions
             WHERE template_id IN (SELECT id FROM templates WHERE name = ?1)",
            params![name],
        )?;
        conn.execute(
            "DELETE FROM template_dependencies
             WHERE template_id IN (SELECT id FROM templates WHERE name = ?1)",
            params![name],
        )?;
        conn.execute("DELETE FROM templates WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Record the git hash observed for `name` at provisioning time.
    pub fn record_version(&self, name: &str, git_hash: &str) -> Result<()> {
        let version = git_hash.chars().take(8).collect::<String>();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO template_versions (template_id, version, git_hash)
             SELECT id, ?2, ?3 FROM templates WHERE name = ?1",
            params![name, version, git_hash],
        )?;
        Ok(())
    }

    /// Load every persisted record, ordered by name.
    pub fn load_all(&self) -> Result<Vec<TemplateRecord>> {
        type Row = (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            bool,
            Option<String>,
            Option<String>,
        );

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT name, url, description, category, tags, env_path, ready, schema_json, updated_at
             FROM templates ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok::<Row, rusqlite::Error>((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<Row>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (name, url, description, category, tags, env_path, ready, schema_json, updated_at) in
            rows
        {
            let parameter_schema_cache = schema_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            let last_updated = updated_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            records.push(TemplateRecord {
                name,
                source_url: url,
                description: description.unwrap_or_default(),
                category: category.filter(|c| !c.is_empty()),
                tags: tags
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or_default(),
                environment_handle: env_path.map(PathBuf::from),
                ready,
                last_updated,
                parameter_schema_cache,
            });
        }
        Ok(records)
    }
}
