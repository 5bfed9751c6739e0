//! 일봉 OHLCV 가격 데이터.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 하루 단위 OHLCV 바.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct PriceBar {
    /// 거래일
    pub date: NaiveDate,
    /// 시가
    pub open: f64,
    /// 고가
    pub high: f64,
    /// 저가
    pub low: f64,
    /// 종가
    pub close: f64,
    /// 거래량
    pub volume: f64,
}

impl PriceBar {
    /// 새 가격 바를 생성합니다.
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 모든 값이 유한한 숫자인지 확인합니다.
    ///
    /// 결측 값(NaN, 무한대)이 하나라도 있는 행은 학습에 사용하지 않습니다.
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// 가격 바 목록에서 종가만 추출합니다.
pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// 결측 값이 있는 행을 제거하고 날짜순으로 정렬합니다.
///
/// 같은 날짜가 여러 번 나오면 마지막 행만 남깁니다.
pub fn clean_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.retain(PriceBar::is_complete);
    bars.sort_by_key(|b| b.date);

    let mut cleaned: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match cleaned.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => cleaned.push(bar),
        }
    }
    cleaned
}

/// 심볼을 파일 이름에 쓸 수 있는 대문자 식별자로 바꿉니다.
///
/// 영숫자와 `-`, `_`, `.` 외의 문자는 `_`로 바뀝니다.
pub fn symbol_file_stem(symbol: &str) -> String {
    symbol
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
