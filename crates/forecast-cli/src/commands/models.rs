//! 저장된 모델 상태 조회 명령어.

use forecast_models::ModelStatus;

use super::train::format_opt;
use super::Context;

/// 심볼의 모델 종류별 학습 상태.
pub fn run_models(ctx: &Context, symbol: Option<&str>) -> (String, Vec<ModelStatus>) {
    let symbol = ctx.symbol(symbol);
    let status = ctx.forecaster.status(&symbol);
    (symbol, status)
}

/// 상태 표 출력.
pub fn print_models(symbol: &str, models: &[ModelStatus]) {
    println!("\n{} 모델 ({})", symbol, models.len());
    println!(
        "{:<6} {:<8} {:<25} {:>14} {:>14}",
        "MODEL", "TRAINED", "TRAINED AT", "RMSE", "MAE"
    );
    for status in models {
        let trained_at = status
            .trained_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        let (rmse, mae) = match &status.metrics {
            Some(m) => (format_opt(m.validation_rmse), format_opt(m.validation_mae)),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<6} {:<8} {:<25} {:>14} {:>14}",
            status.kind.label(),
            if status.trained { "yes" } else { "no" },
            trained_at,
            rmse,
            mae
        );
        if let Some(error) = &status.error {
            println!("       ! {}", error);
        }
    }
}
