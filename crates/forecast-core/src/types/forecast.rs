//! 예측 결과 타입.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::price::PriceBar;

/// 응답과 CSV에서 사용하는 날짜 형식.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 날짜와 가격이 짝지어진 시계열.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct PriceSeries {
    /// `YYYY-MM-DD` 형식의 날짜
    pub dates: Vec<String>,
    /// 날짜별 가격
    pub prices: Vec<f64>,
}

impl PriceSeries {
    /// 날짜와 가격 목록으로 시계열을 생성합니다.
    pub fn new(dates: &[NaiveDate], prices: Vec<f64>) -> Self {
        Self {
            dates: dates
                .iter()
                .map(|d| d.format(DATE_FORMAT).to_string())
                .collect(),
            prices,
        }
    }

    /// 가격 바의 종가로 시계열을 생성합니다.
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars
                .iter()
                .map(|b| b.date.format(DATE_FORMAT).to_string())
                .collect(),
            prices: bars.iter().map(|b| b.close).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// 다일 예측 응답: 미래 예측치와 그 기반이 된 과거 종가.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ForecastResponse {
    /// 예측 구간
    pub prediction: PriceSeries,
    /// 과거 구간
    pub historical: PriceSeries,
}

/// 마지막 날짜 다음 날부터 `days`일 동안의 달력 날짜를 생성합니다.
pub fn future_dates(last: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (1..=days as i64)
        .map(|offset| last + Duration::days(offset))
        .collect()
}
