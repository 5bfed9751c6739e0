//! 가격 예측 API 서버.
//!
//! 설정을 읽고 데이터베이스(선택)와 시세 제공자를 연결한 뒤 Axum 서버를 시작합니다.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{error, info, warn};

use forecast_api::app::create_router;
use forecast_api::metrics::setup_metrics_recorder;
use forecast_api::state::AppState;
use forecast_core::{init_logging, AppConfig, LogConfig};
use forecast_data::{Database, YahooPriceProvider};

/// 설정 파일 경로를 덮어쓰는 환경 변수.
const CONFIG_PATH_ENV: &str = "FORECAST_CONFIG";

/// 설정 로드. `FORECAST_CONFIG`가 있으면 해당 파일이 반드시 있어야 합니다.
fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            AppConfig::load(&path).with_context(|| format!("failed to load config from {}", path))?
        }
        Err(_) => AppConfig::load_default().context("failed to load default config")?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// 데이터베이스 연결 시도. 실패하면 파일 기반으로 계속 동작합니다.
async fn connect_database(config: &AppConfig) -> Option<Database> {
    config.database.resolved_url()?;

    let db = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            warn!(error = %e, "Database unavailable, continuing with file storage only");
            return None;
        }
    };

    if let Err(e) = db.migrate().await {
        warn!(error = %e, "Database migration failed, continuing with file storage only");
        return None;
    }

    Some(db)
}

/// OpenAPI 스펙 내보내기 처리.
///
/// `--export-openapi` 플래그 또는 `EXPORT_OPENAPI` 환경변수가 설정된 경우
/// OpenAPI JSON 스펙을 stdout으로 출력하고 `true`를 반환합니다.
fn handle_export_openapi() -> anyhow::Result<bool> {
    use forecast_api::openapi::ApiDoc;
    use utoipa::OpenApi as _;

    let export_flag = std::env::args().any(|arg| arg == "--export-openapi");
    let export_env = std::env::var("EXPORT_OPENAPI")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if export_flag || export_env {
        let json = serde_json::to_string_pretty(&ApiDoc::openapi())?;
        println!("{}", json);
        return Ok(true);
    }

    Ok(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    if handle_export_openapi()? {
        return Ok(());
    }

    let config = load_config()?;
    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    info!("Starting Forecast API server...");

    let metrics_handle =
        setup_metrics_recorder().map_err(|e| anyhow!("failed to install metrics recorder: {}", e))?;
    info!("Prometheus metrics recorder initialized");

    let provider = YahooPriceProvider::new().context("failed to create Yahoo Finance provider")?;
    let db = connect_database(&config).await;
    let addr = (config.server.host.clone(), config.server.port);

    let mut state = AppState::new(config, Arc::new(provider));
    if let Some(db) = db {
        state = state.with_database(db);
    }
    let state = Arc::new(state);

    info!(
        version = %state.version,
        symbol = %state.config.data.symbol,
        has_db = state.db.is_some(),
        model_dir = %state.config.model.model_dir.display(),
        "Application state initialized"
    );

    let app = create_router(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind((addr.0.as_str(), addr.1))
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    let local_addr = listener.local_addr()?;

    info!(%local_addr, "API server listening");
    info!("Swagger UI available at http://{}/swagger-ui", local_addr);
    info!("Metrics available at http://{}/metrics", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기 (Ctrl+C 또는 SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
