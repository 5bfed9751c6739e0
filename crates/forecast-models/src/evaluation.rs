//! 학습 결과 평가 지표.

use serde::{Deserialize, Serialize};

/// 학습 후 기록되는 지표. 검증 오차는 원래 가격 단위입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct TrainingMetrics {
    pub train_samples: usize,
    pub test_samples: usize,
    pub epochs: usize,
    /// 정규화 공간의 마지막 학습 MSE
    pub final_train_loss: Option<f64>,
    pub validation_rmse: Option<f64>,
    pub validation_mae: Option<f64>,
    /// ARIMA 전용 정보 기준
    pub aic: Option<f64>,
}

/// 평균 제곱근 오차. 빈 입력이면 None.
pub fn rmse(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    let n = predicted.len().min(actual.len());
    if n == 0 {
        return None;
    }
    let mse = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / n as f64;
    Some(mse.sqrt())
}

/// 평균 절대 오차. 빈 입력이면 None.
pub fn mae(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    let n = predicted.len().min(actual.len());
    if n == 0 {
        return None;
    }
    Some(
        predicted
            .iter()
            .zip(actual)
            .map(|(p, a)| (p - a).abs())
            .sum::<f64>()
            / n as f64,
    )
}
