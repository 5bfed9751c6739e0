//! 예측 모델 종류와 ARIMA 차수.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 예측 모델 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// 장단기 메모리 순환 신경망
    Lstm,
    /// 게이트 순환 유닛 신경망
    Gru,
    /// 자기회귀 누적 이동평균
    Arima,
}

impl ModelKind {
    /// 지원하는 모든 모델.
    pub const ALL: [ModelKind; 3] = [ModelKind::Lstm, ModelKind::Gru, ModelKind::Arima];

    /// 소문자 식별자를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Lstm => "lstm",
            ModelKind::Gru => "gru",
            ModelKind::Arima => "arima",
        }
    }

    /// 액션 로그에 쓰이는 대문자 이름을 반환합니다.
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::Lstm => "LSTM",
            ModelKind::Gru => "GRU",
            ModelKind::Arima => "ARIMA",
        }
    }

    /// 순환 신경망 계열 모델인지 확인합니다.
    pub fn is_recurrent(&self) -> bool {
        matches!(self, ModelKind::Lstm | ModelKind::Gru)
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Lstm
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lstm" => Ok(ModelKind::Lstm),
            "gru" => Ok(ModelKind::Gru),
            "arima" => Ok(ModelKind::Arima),
            _ => Err(CoreError::UnknownModel(s.to_string())),
        }
    }
}

/// ARIMA(p, d, q) 차수.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ArimaOrder {
    /// 자기회귀 차수
    pub p: usize,
    /// 차분 차수
    pub d: usize,
    /// 이동평균 차수
    pub q: usize,
}

impl ArimaOrder {
    /// 새 차수를 생성합니다.
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// 적합에 필요한 최소 관측치 수.
    pub fn min_observations(&self) -> usize {
        self.p + self.d + self.q + 10
    }
}

impl Default for ArimaOrder {
    fn default() -> Self {
        Self::new(5, 1, 0)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}
