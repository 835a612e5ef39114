//! Database source: runs a configured read-only query and extracts the rows
//! as ordered records.
//!
//! The query text is screened before every execution: statements that could
//! mutate the store or couple the configuration to a concrete deployment
//! (explicit table prefixes) are rejected outright. `prefix_` is the
//! portable spelling and is rewritten to the real table prefix at run time.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use crate::connectors::settings::{self, SettingsEnvelope};
use crate::connectors::{BuildContext, Connector, Source};
use crate::data::{Data, Record};
use crate::errors::ConnectorError;
use crate::logging::ScopedLogger;
use crate::models::SubmittedSettings;

pub const VARIANT: &str = "database";

/// Keywords that make a query destructive or schema-changing.
const FORBIDDEN_WORDS: [&str; 9] = [
    "ALTER", "CREATE", "DELETE", "DROP", "GRANT", "INSERT", "INTO", "TRUNCATE", "UPDATE",
];

/// The real table prefix of this store; queries must spell it `prefix_`.
const TABLE_PREFIX: &str = "etl_";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseSourceSettings {
    pub query_sql: String,
    pub notify_emails: Vec<String>,
}

pub struct DatabaseSource {
    settings: DatabaseSourceSettings,
    pool: SqlitePool,
    timezone: Tz,
    user_id: i64,
}

impl DatabaseSource {
    pub fn new(
        settings: DatabaseSourceSettings,
        pool: SqlitePool,
        timezone: Tz,
        user_id: i64,
    ) -> Self {
        Self {
            settings,
            pool,
            timezone,
            user_id,
        }
    }

    pub fn from_envelope(
        ctx: &BuildContext,
        envelope: &SettingsEnvelope,
    ) -> Result<Self, ConnectorError> {
        Ok(Self::new(
            envelope.unpack(VARIANT)?,
            ctx.pool.clone(),
            ctx.timezone,
            ctx.query_user_id,
        ))
    }

    /// Reject queries that could mutate the store or reference the concrete
    /// table prefix directly.
    pub fn screen_query(sql: &str) -> Result<(), ConnectorError> {
        if sql.trim().is_empty() {
            return Err(ConnectorError::invalid_settings(
                "query_sql",
                "a query is required",
            ));
        }
        if sql.contains(';') {
            return Err(ConnectorError::unsafe_query("semicolons are not allowed"));
        }

        let forbidden = format!(r"(?i)\b({})\b", FORBIDDEN_WORDS.join("|"));
        if Regex::new(&forbidden)
            .map(|regex| regex.is_match(sql))
            .unwrap_or(false)
        {
            return Err(ConnectorError::unsafe_query(format!(
                "query contains forbidden keywords ({})",
                FORBIDDEN_WORDS.join(", ")
            )));
        }

        let explicit_prefix = format!(r"(?i)\b{TABLE_PREFIX}\w+");
        if Regex::new(&explicit_prefix)
            .map(|regex| regex.is_match(sql))
            .unwrap_or(false)
        {
            return Err(ConnectorError::unsafe_query(format!(
                "tables must be referenced as prefix_name, not {TABLE_PREFIX}name"
            )));
        }

        Ok(())
    }

    /// Substitute the portable prefix and the time/user placeholders.
    fn prepare_query(&self, now: i64) -> Result<String, ConnectorError> {
        Self::screen_query(&self.settings.query_sql)?;

        let (start, end) = day_window(now, self.timezone);
        let sql = self.settings.query_sql.replace("prefix_", TABLE_PREFIX);
        Ok(sql
            .replace("%%STARTTIME%%", &start.to_string())
            .replace("%%ENDTIME%%", &end.to_string())
            .replace("%%USERID%%", &self.user_id.to_string()))
    }
}

/// Midnight-to-midnight window covering the previous civil day.
fn day_window(now: i64, tz: Tz) -> (i64, i64) {
    let Some(utc) = DateTime::<Utc>::from_timestamp(now, 0) else {
        return (now, now);
    };
    let today = tz.from_utc_datetime(&utc.naive_utc()).date_naive();
    let midnight = |date: chrono::NaiveDate| {
        tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
            .earliest()
            .map(|dt| dt.timestamp())
            .unwrap_or(now)
    };
    (midnight(today.pred_opt().unwrap_or(today)), midnight(today))
}

/// Decode one column into a JSON value following its declared type.
fn column_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    match raw.type_info().name() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

impl Connector for DatabaseSource {
    fn variant_id(&self) -> &'static str {
        VARIANT
    }

    fn name(&self) -> &str {
        "Database"
    }

    fn settings_value(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(&self.settings)?)
    }

    fn apply_submitted(&mut self, submitted: &SubmittedSettings) -> Result<(), ConnectorError> {
        self.settings = settings::apply_overrides(&self.settings, submitted)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConnectorError> {
        Self::screen_query(&self.settings.query_sql)
    }

    fn notify_emails(&self) -> &[String] {
        &self.settings.notify_emails
    }
}

#[async_trait]
impl Source for DatabaseSource {
    async fn is_available(&mut self, log: &ScopedLogger<'_>) -> bool {
        match Self::screen_query(&self.settings.query_sql) {
            Ok(()) => true,
            Err(e) => {
                log.error("extract", &format!("Query rejected: {e}"), "").await;
                false
            }
        }
    }

    async fn extract(&mut self, log: &ScopedLogger<'_>) -> Result<Data, ConnectorError> {
        if !self.is_available(log).await {
            return Err(ConnectorError::unavailable(
                self.name(),
                "the configured query failed the safety screen",
            ));
        }

        let sql = self.prepare_query(Utc::now().timestamp())?;
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Record::new();
            for (index, column) in row.columns().iter().enumerate() {
                record.insert(column.name().to_string(), column_value(row, index));
            }
            records.push(record);
        }

        log.info("extract", &format!("Query returned {} rows", records.len()))
            .await;

        Ok(Data::with_records(records))
    }
}
