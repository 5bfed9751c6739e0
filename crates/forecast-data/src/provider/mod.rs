//! 시세 데이터 제공자.

mod yahoo;

pub use yahoo::YahooPriceProvider;

use async_trait::async_trait;
use chrono::NaiveDate;
use forecast_core::PriceBar;

use crate::error::Result;

/// 일봉 가격 이력을 제공하는 외부 소스.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// 제공자 이름.
    fn name(&self) -> &str;

    /// `[start, end)` 구간의 일봉을 날짜 오름차순으로 가져옵니다.
    ///
    /// 결과가 없으면 빈 벡터를 반환합니다.
    async fn fetch_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<PriceBar>>;
}

/// 고정된 가격 목록을 돌려주는 제공자 (테스트/오프라인용).
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Default)]
pub struct StaticPriceProvider {
    bars: Vec<PriceBar>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticPriceProvider {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars }
    }

    /// `start`부터 하루 간격으로 종가 목록을 배치한 제공자를 만듭니다.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Self {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let date = start + chrono::Duration::days(i as i64);
                PriceBar::new(date, c, c * 1.01, c * 0.99, c, 1_000.0)
            })
            .collect();
        Self { bars }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl PriceProvider for StaticPriceProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_daily(
        &self,
        _symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        Ok(self
            .bars
            .iter()
            .filter(|b| b.date >= start && b.date < end)
            .copied()
            .collect())
    }
}
