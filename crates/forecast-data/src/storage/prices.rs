//! `price_data` 테이블 저장소.

use chrono::NaiveDate;
use forecast_core::PriceBar;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use crate::error::{DataError, Result};

/// 가격 데이터 레코드.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct PriceRecord {
    pub id: i64,
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceRecord {
    /// 저장소 밖에서 만든 바에 ID를 붙여 레코드로 만듭니다.
    pub fn from_bar(id: i64, symbol: &str, bar: &PriceBar) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    pub fn to_bar(&self) -> PriceBar {
        PriceBar::new(self.date, self.open, self.high, self.low, self.close, self.volume)
    }
}

/// 가격 데이터 저장소.
#[derive(Clone)]
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 날짜순으로 페이지 단위 조회. `symbol`이 없으면 모든 심볼을 포함합니다.
    #[instrument(skip(self))]
    pub async fn list(&self, symbol: Option<&str>, skip: i64, limit: i64) -> Result<Vec<PriceRecord>> {
        let records = sqlx::query_as::<_, PriceRecord>(
            r#"
            SELECT id, symbol, date, open, high, low, close, volume
            FROM price_data
            WHERE ($1::text IS NULL OR symbol = $1)
            ORDER BY date ASC, id ASC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// 심볼의 전체 이력을 가격 바로 조회합니다.
    pub async fn load_bars(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        let records = sqlx::query_as::<_, PriceRecord>(
            r#"
            SELECT id, symbol, date, open, high, low, close, volume
            FROM price_data
            WHERE symbol = $1
            ORDER BY date ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.iter().map(PriceRecord::to_bar).collect())
    }

    /// 가격 바 하나를 삽입합니다.
    pub async fn insert(&self, symbol: &str, bar: &PriceBar) -> Result<PriceRecord> {
        let record = sqlx::query_as::<_, PriceRecord>(
            r#"
            INSERT INTO price_data (symbol, date, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, symbol, date, open, high, low, close, volume
            "#,
        )
        .bind(symbol)
        .bind(bar.date)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// UNNEST를 사용한 배치 upsert. 같은 (symbol, date)는 최신 값으로 덮어씁니다.
    #[instrument(skip(self, bars), fields(count = bars.len()))]
    pub async fn upsert_many(&self, symbol: &str, bars: &[PriceBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
        let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO price_data (symbol, date, open, high, low, close, volume)
            SELECT $1::text, * FROM UNNEST($2::date[], $3::float8[], $4::float8[], $5::float8[], $6::float8[], $7::float8[])
            ON CONFLICT (symbol, date) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume
            "#,
        )
        .bind(symbol)
        .bind(dates)
        .bind(opens)
        .bind(highs)
        .bind(lows)
        .bind(closes)
        .bind(volumes)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::InsertError(e.to_string()))?;

        debug!(symbol, affected = result.rows_affected(), "Price data upserted");
        Ok(result.rows_affected() as usize)
    }

    /// 저장된 행 수.
    pub async fn count(&self, symbol: Option<&str>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM price_data WHERE ($1::text IS NULL OR symbol = $1)",
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
