//! 가격 예측 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 설정된 구간의 BTC-USD 일봉 수집
//! forecast collect
//!
//! # 특정 구간 수집
//! forecast collect -s ETH-USD -f 2023-01-01 -t 2024-01-01
//!
//! # 모든 모델 학습 / GRU만 학습
//! forecast train
//! forecast train -m gru
//!
//! # 7일 예측 (모델이 없으면 학습)
//! forecast predict -m lstm -d 7 --train
//!
//! # 모델 상태 확인
//! forecast models
//! ```

use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use forecast_cli::commands::collect::{print_report, run_collect};
use forecast_cli::commands::models::{print_models, run_models};
use forecast_cli::commands::predict::{print_forecast, run_predict, PredictOptions};
use forecast_cli::commands::train::{print_reports, run_train};
use forecast_cli::commands::{parse_date, Context};
use forecast_core::{init_logging, AppConfig, LogConfig, ModelKind, DEFAULT_CONFIG_PATH};
use forecast_data::{Database, YahooPriceProvider};

#[derive(Parser)]
#[command(name = "forecast")]
#[command(about = "Crypto price forecast CLI - LSTM/GRU/ARIMA 종가 예측", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// 심볼 (기본: 설정의 data.symbol)
    #[arg(short, long, global = true)]
    symbol: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 일봉 데이터 수집 (Yahoo Finance → CSV, 데이터베이스)
    Collect {
        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: Option<String>,

        /// 종료 날짜, 미포함 (YYYY-MM-DD)
        #[arg(short, long)]
        to: Option<String>,
    },

    /// 모델 학습
    Train {
        /// 학습할 모델 (lstm, gru, arima). 생략하면 전체
        #[arg(short, long = "model")]
        models: Vec<ModelKind>,

        /// 진행률 막대 숨김
        #[arg(long)]
        quiet: bool,
    },

    /// 가격 예측
    Predict {
        /// 모델 (lstm, gru, arima)
        #[arg(short, long, default_value = "lstm")]
        model: ModelKind,

        /// 예측 일수 (1-365)
        #[arg(short, long, default_value = "5")]
        days: usize,

        /// 모델이 없으면 먼저 학습
        #[arg(long)]
        train: bool,

        /// 함께 출력할 과거 종가 수 (0 = 전체)
        #[arg(long, default_value = "10")]
        history: usize,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 저장된 모델 상태 조회
    Models,
}

/// 설정 로드. 기본 경로는 파일이 없어도 되지만, 지정한 경로는 있어야 합니다.
fn load_config(path: &str) -> Result<AppConfig> {
    let config = if path == DEFAULT_CONFIG_PATH {
        AppConfig::load_default()
    } else {
        AppConfig::load(path)
    }
    .with_context(|| format!("failed to load config from {}", path))?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    let db = match config.database.resolved_url() {
        Some(_) => match Database::connect(&config.database).await {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(error = %e, "Database unavailable, using CSV datasets only");
                None
            }
        },
        None => None,
    };

    let provider = YahooPriceProvider::new().context("failed to create Yahoo Finance provider")?;
    let mut ctx = Context::new(config, Arc::new(provider));
    if let Some(db) = db {
        db.migrate().await?;
        ctx.collector = ctx
            .collector
            .with_repository(forecast_data::PriceRepository::new(db.pool().clone()));
    }
    let symbol = cli.symbol.as_deref();

    match cli.command {
        Commands::Collect { from, to } => {
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?;
            let report = run_collect(&ctx, symbol, from, to).await?;
            print_report(&report);
        }

        Commands::Train { models, quiet } => {
            let kinds = if models.is_empty() {
                ModelKind::ALL.to_vec()
            } else {
                models
            };
            let reports = run_train(&ctx, symbol, &kinds, !quiet).await?;
            info!(models = reports.len(), "Training finished");
            print_reports(&reports);
        }

        Commands::Predict {
            model,
            days,
            train,
            history,
            json,
        } => {
            let options = PredictOptions {
                kind: model,
                days,
                train_if_missing: train,
                history,
            };
            let forecast = run_predict(&ctx, symbol, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
            } else {
                print_forecast(model, &forecast);
            }
        }

        Commands::Models => {
            let (symbol, models) = run_models(&ctx, symbol);
            print_models(&symbol, &models);
        }
    }

    Ok(())
}
