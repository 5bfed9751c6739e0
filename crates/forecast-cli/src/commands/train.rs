//! 모델 학습 명령어.
//!
//! 순환 신경망은 에폭마다 진행률 막대를 갱신합니다.

use anyhow::{Context as _, Result};
use forecast_core::{closes, ModelKind};
use forecast_models::{EpochStats, TrainingReport};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::Context;

/// 저장된 데이터셋(없으면 수집)으로 모델들을 차례로 학습합니다.
pub async fn run_train(
    ctx: &Context,
    symbol: Option<&str>,
    kinds: &[ModelKind],
    show_progress: bool,
) -> Result<Vec<TrainingReport>> {
    let symbol = ctx.symbol(symbol);
    let (start, end) = ctx.range(None, None)?;
    let bars = ctx.collector.load_or_collect(&symbol, start, end).await?;
    let closes = closes(&bars);
    info!(symbol = %symbol, samples = closes.len(), "Loaded training data");

    let mut reports = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let pb = if show_progress {
            progress_bar(kind, ctx.config.model.epochs)?
        } else {
            ProgressBar::hidden()
        };

        let forecaster = ctx.forecaster.clone();
        let task_symbol = symbol.clone();
        let task_closes = closes.clone();
        let task_pb = pb.clone();
        let result = tokio::task::spawn_blocking(move || {
            forecaster.train(&task_symbol, kind, &task_closes, &mut |stats: &EpochStats| {
                task_pb.set_position(stats.epoch as u64);
                task_pb.set_message(format!("loss {:.6}", stats.train_loss));
            })
        })
        .await
        .context("training task panicked")?;

        match result {
            Ok(report) => {
                pb.finish_with_message("done");
                reports.push(report);
            }
            Err(e) => {
                pb.abandon_with_message("failed");
                return Err(e).with_context(|| format!("{} training failed", kind.label()));
            }
        }
    }

    Ok(reports)
}

fn progress_bar(kind: ModelKind, epochs: usize) -> Result<ProgressBar> {
    let pb = if kind.is_recurrent() {
        let pb = ProgressBar::new(epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>6} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{prefix:>6} {spinner:.green} {msg}")?);
        pb.set_message("fitting");
        pb
    };
    pb.set_prefix(kind.label());
    Ok(pb)
}

/// 학습 결과 요약 출력.
pub fn print_reports(reports: &[TrainingReport]) {
    println!();
    println!(
        "{:<6} {:>8} {:>8} {:>14} {:>14} {:>10}",
        "MODEL", "TRAIN", "TEST", "RMSE", "MAE", "TIME(ms)"
    );
    for report in reports {
        let m = &report.metrics;
        println!(
            "{:<6} {:>8} {:>8} {:>14} {:>14} {:>10}",
            report.kind.label(),
            m.train_samples,
            m.test_samples,
            format_opt(m.validation_rmse),
            format_opt(m.validation_mae),
            report.duration_ms
        );
    }
}

pub(crate) fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;

    #[tokio::test]
    async fn test_train_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let reports = run_train(&ctx, None, &ModelKind::ALL, false).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].kind, ModelKind::Lstm);
        assert_eq!(reports[0].history.len(), 3);
        assert!(reports[2].history.is_empty());
        for kind in ModelKind::ALL {
            assert!(ctx.forecaster.store().exists("BTC-USD", kind));
        }
    }

    #[test]
    fn test_format_opt() {
        assert_eq!(format_opt(None), "-");
        assert_eq!(format_opt(Some(1.23456)), "1.2346");
    }
}
