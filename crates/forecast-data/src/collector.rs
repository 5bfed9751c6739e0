//! 가격 이력 수집기.
//!
//! 외부 제공자에서 일봉을 내려받아 CSV 데이터셋으로 저장하고,
//! 데이터베이스가 연결되어 있으면 `price_data` 테이블에도 반영합니다.

use chrono::NaiveDate;
use forecast_core::{clean_bars, PriceBar};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::dataset::DatasetStore;
use crate::error::{DataError, Result};
use crate::provider::PriceProvider;
use crate::storage::PriceRepository;

/// 수집 결과 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct CollectReport {
    pub symbol: String,
    /// 결측 제거 후 저장된 행 수
    pub rows: usize,
    /// 결측으로 제외된 행 수
    pub dropped_rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// CSV 파일 경로
    #[cfg_attr(feature = "utoipa-support", schema(value_type = String))]
    pub path: PathBuf,
    /// 데이터베이스에 반영된 행 수 (데이터베이스가 없으면 None)
    pub stored_rows: Option<usize>,
}

/// 제공자 → 데이터셋 → 데이터베이스로 이어지는 수집 파이프라인.
#[derive(Clone)]
pub struct DataCollector {
    provider: Arc<dyn PriceProvider>,
    datasets: DatasetStore,
    prices: Option<PriceRepository>,
}

impl DataCollector {
    pub fn new(provider: Arc<dyn PriceProvider>, datasets: DatasetStore) -> Self {
        Self {
            provider,
            datasets,
            prices: None,
        }
    }

    /// 데이터베이스 저장소를 연결합니다.
    pub fn with_repository(mut self, prices: PriceRepository) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// `[start, end)` 구간을 내려받아 저장합니다.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn collect(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<CollectReport> {
        if start >= end {
            return Err(DataError::InvalidData(format!(
                "start date {} must be before end date {}",
                start, end
            )));
        }

        let raw = self.provider.fetch_daily(symbol, start, end).await?;
        let raw_len = raw.len();
        let bars = clean_bars(raw);

        let (first, last) = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => {
                warn!(symbol, "Provider returned no usable rows");
                return Err(DataError::NoData {
                    symbol: symbol.to_string(),
                });
            }
        };

        let path = self.datasets.save(symbol, &bars)?;

        let stored_rows = match &self.prices {
            Some(repo) => Some(repo.upsert_many(symbol, &bars).await?),
            None => None,
        };

        info!(
            symbol,
            rows = bars.len(),
            dropped = raw_len - bars.len(),
            first = %first,
            last = %last,
            "Price history collected"
        );

        Ok(CollectReport {
            symbol: symbol.to_string(),
            rows: bars.len(),
            dropped_rows: raw_len - bars.len(),
            first_date: first,
            last_date: last,
            path,
            stored_rows,
        })
    }

    /// 저장된 데이터셋을 읽고, 없으면 먼저 수집합니다.
    pub async fn load_or_collect(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        if !self.datasets.exists(symbol) {
            info!(symbol, "Dataset missing, collecting");
            self.collect(symbol, start, end).await?;
        }
        let bars = clean_bars(self.datasets.load(symbol)?);
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}
