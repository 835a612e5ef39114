use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};

use crate::config::DatabaseConfig;

pub mod logs;
pub mod schedules;
pub mod tasks;

/// Embedded migrations, applied in order at startup.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial_schema.sql",
    include_str!("../../migrations/0001_initial_schema.sql"),
)];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // An in-memory database lives and dies with its connection, so it
        // must not be spread across a pool.
        let in_memory = config.url.contains(":memory:");

        // Create database if it doesn't exist (for SQLite)
        if !in_memory && !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let max_connections = if in_memory {
            1
        } else {
            config.max_connections.unwrap_or(10)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// A pool-backed handle for tests and embedded use.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        self.run_embedded_migrations().await?;
        Ok(())
    }

    async fn run_embedded_migrations(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MIGRATIONS {
            // Extract version from filename (e.g., "0001_initial_schema.sql" -> 1)
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _sqlx_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue; // Migration already applied
            }

            let mut transaction = self.pool.begin().await?;
            for statement in content.split(';').filter(|s| !s.trim().is_empty()) {
                sqlx::query(statement).execute(&mut *transaction).await?;
            }
            sqlx::query(
                "INSERT INTO _sqlx_migrations (version, description, success) VALUES (?, ?, true)",
            )
            .bind(version)
            .bind(name)
            .execute(&mut *transaction)
            .await?;
            transaction.commit().await?;
            tracing::info!("Applied migration: {}", name);
        }

        Ok(())
    }

    /// Allocate the next run id by recording a new runner invocation.
    pub async fn begin_run(&self) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO etl_runs DEFAULT VALUES")
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
pub(crate) async fn test_database() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Database::from_pool(pool);
    db.migrate().await.unwrap();
    db
}
