//! Yahoo Finance 일봉 제공자.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate};
use forecast_core::{clean_bars, PriceBar};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::PriceProvider;
use crate::error::{DataError, Result};

/// Yahoo Finance 차트 API를 사용하는 제공자.
pub struct YahooPriceProvider {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooPriceProvider {
    pub fn new() -> Result<Self> {
        let connector = yahoo_finance_api::YahooConnector::new()
            .map_err(|e| DataError::ConnectionError(format!("Yahoo Finance 연결 실패: {}", e)))?;
        Ok(Self { connector })
    }
}

#[async_trait]
impl PriceProvider for YahooPriceProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(skip(self))]
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let start_ts = naive_date_to_offset_datetime(start)?;
        let end_ts = naive_date_to_offset_datetime(end)?;

        debug!(symbol, start = %start, end = %end, "Yahoo Finance API 날짜 범위 호출");

        let response = self
            .connector
            .get_quote_history_interval(symbol, start_ts, end_ts, "1d")
            .await
            .map_err(|e| DataError::FetchError(format!("Yahoo Finance API 오류 ({}): {}", symbol, e)))?;

        // 데이터가 없는 구간은 quotes()가 에러를 돌려주므로 빈 결과로 취급
        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(e) => {
                debug!(symbol, error = %e, "Yahoo Finance 응답에 시세가 없음");
                return Ok(Vec::new());
            }
        };

        let bars = quotes
            .iter()
            .filter_map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                Some(PriceBar::new(
                    date,
                    q.open,
                    q.high,
                    q.low,
                    q.close,
                    q.volume as f64,
                ))
            })
            .filter(|b| b.date >= start && b.date < end)
            .collect();

        Ok(clean_bars(bars))
    }
}

/// NaiveDate를 UTC 자정의 OffsetDateTime으로 변환.
fn naive_date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime> {
    let month = time::Month::try_from(date.month() as u8)
        .map_err(|e| DataError::InvalidData(format!("잘못된 월: {}", e)))?;
    let day = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
        .map_err(|e| DataError::InvalidData(format!("잘못된 날짜 {}: {}", date, e)))?;
    Ok(day.midnight().assume_utc())
}
