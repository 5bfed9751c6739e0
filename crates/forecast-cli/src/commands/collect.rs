//! 시세 수집 명령어.

use anyhow::Result;
use chrono::NaiveDate;
use forecast_data::CollectReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

use super::Context;

/// 구간 `[from, to)`의 일봉을 내려받아 데이터셋(과 데이터베이스)에 저장합니다.
pub async fn run_collect(
    ctx: &Context,
    symbol: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<CollectReport> {
    let symbol = ctx.symbol(symbol);
    let (start, end) = ctx.range(from, to)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!(
        "Fetching {} from {}...",
        symbol,
        ctx.collector.provider_name()
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = ctx.collector.collect(&symbol, start, end).await;
    pb.finish_and_clear();
    let report = result?;

    info!(
        symbol = %report.symbol,
        rows = report.rows,
        path = %report.path.display(),
        "Collection finished"
    );
    Ok(report)
}

/// 수집 결과 출력.
pub fn print_report(report: &CollectReport) {
    println!("\n데이터 수집 완료: {} ({} 행)", report.symbol, report.rows);
    println!("기간: {} ~ {}", report.first_date, report.last_date);
    if report.dropped_rows > 0 {
        println!("결측 제외: {} 행", report.dropped_rows);
    }
    println!("저장 위치: {}", report.path.display());
    if let Some(stored) = report.stored_rows {
        println!("데이터베이스 반영: {} 행", stored);
    }
}
