//! 가격 예측 명령어.

use anyhow::{Context as _, Result};
use forecast_core::{closes, future_dates, ForecastResponse, ModelKind, PriceSeries};
use tracing::info;

use super::Context;

/// 예측 명령 옵션.
#[derive(Debug, Clone)]
pub struct PredictOptions {
    pub kind: ModelKind,
    pub days: usize,
    /// 모델이 없으면 먼저 학습
    pub train_if_missing: bool,
    /// 출력에 포함할 과거 종가 수 (0이면 전체)
    pub history: usize,
}

/// `days`일 예측을 수행합니다.
pub async fn run_predict(
    ctx: &Context,
    symbol: Option<&str>,
    options: &PredictOptions,
) -> Result<ForecastResponse> {
    anyhow::ensure!(
        (1..=365).contains(&options.days),
        "days must be between 1 and 365, got {}",
        options.days
    );

    let symbol = ctx.symbol(symbol);
    let (start, end) = ctx.range(None, None)?;
    let bars = ctx.collector.load_or_collect(&symbol, start, end).await?;
    let last_date = bars
        .last()
        .map(|b| b.date)
        .context("no price data available")?;

    let forecaster = ctx.forecaster.clone();
    let task_symbol = symbol.clone();
    let task_closes = closes(&bars);
    let (kind, days, train) = (options.kind, options.days, options.train_if_missing);
    let forecast = tokio::task::spawn_blocking(move || {
        if train {
            forecaster
                .forecast_or_train(&task_symbol, kind, &task_closes, days)
                .map(|(forecast, _)| forecast)
        } else {
            forecaster.forecast(&task_symbol, kind, &task_closes, days)
        }
    })
    .await
    .context("prediction task panicked")??;

    info!(symbol = %symbol, model = %kind, days, "Forecast complete");

    let history = match options.history {
        0 => &bars[..],
        n => &bars[bars.len().saturating_sub(n)..],
    };

    Ok(ForecastResponse {
        prediction: PriceSeries::new(&future_dates(last_date, days), forecast),
        historical: PriceSeries::from_bars(history),
    })
}

/// 예측 결과를 표로 출력합니다.
pub fn print_forecast(kind: ModelKind, forecast: &ForecastResponse) {
    let history = &forecast.historical;
    if !history.is_empty() {
        println!("\n최근 종가");
        for (date, price) in history.dates.iter().zip(&history.prices) {
            println!("  {}  {:>14.2}", date, price);
        }
    }

    println!("\n{} 예측", kind.label());
    let prediction = &forecast.prediction;
    for (date, price) in prediction.dates.iter().zip(&prediction.prices) {
        println!("  {}  {:>14.2}", date, price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use forecast_models::ModelError;

    fn options(kind: ModelKind, days: usize, train: bool) -> PredictOptions {
        PredictOptions {
            kind,
            days,
            train_if_missing: train,
            history: 5,
        }
    }

    #[tokio::test]
    async fn test_predict_requires_model() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let err = run_predict(&ctx, None, &options(ModelKind::Arima, 3, false))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::NotTrained { .. })
        ));
    }

    #[tokio::test]
    async fn test_predict_trains_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let forecast = run_predict(&ctx, None, &options(ModelKind::Arima, 3, true))
            .await
            .unwrap();
        assert_eq!(forecast.prediction.len(), 3);
        assert_eq!(forecast.historical.len(), 5);
        // 100일치: 2024-01-01 ~ 2024-04-09
        assert_eq!(forecast.historical.dates[4], "2024-04-09");
        assert_eq!(forecast.prediction.dates[0], "2024-04-10");
    }

    #[tokio::test]
    async fn test_predict_rejects_zero_days() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(run_predict(&ctx, None, &options(ModelKind::Lstm, 0, true))
            .await
            .is_err());
    }
}
