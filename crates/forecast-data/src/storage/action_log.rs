//! `logs` 테이블 저장소.

use chrono::{DateTime, Utc};
use forecast_core::ActionLogEntry;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    timestamp: DateTime<Utc>,
    action: String,
    details: Option<String>,
}

impl From<LogRow> for ActionLogEntry {
    fn from(row: LogRow) -> Self {
        ActionLogEntry {
            id: Some(row.id),
            timestamp: row.timestamp,
            action: row.action,
            details: row.details,
        }
    }
}

/// 액션 로그 저장소.
#[derive(Clone)]
pub struct ActionLogRepository {
    pool: PgPool,
}

impl ActionLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 액션을 기록하고 저장된 항목을 반환합니다.
    pub async fn record(&self, action: &str, details: Option<&str>) -> Result<ActionLogEntry> {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            INSERT INTO logs (action, details)
            VALUES ($1, $2)
            RETURNING id, timestamp, action, details
            "#,
        )
        .bind(action)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = row.id, action, "Action logged");
        Ok(row.into())
    }

    /// 최근 항목부터 조회합니다.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<ActionLogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, timestamp, action, details
            FROM logs
            ORDER BY timestamp DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
