//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 Axum의 State extractor를 통해 핸들러에 주입됩니다.

use chrono::{DateTime, NaiveDate, Utc};
use forecast_core::{AppConfig, PriceBar};
use forecast_data::{
    ActionLogRepository, CollectReport, DataCollector, DataError, Database, DatasetStore,
    PriceProvider, PriceRepository,
};
use forecast_models::ForecastService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::journal::ActionJournal;
use crate::metrics::record_collected_rows;
use crate::routes::jobs::TrainingJob;

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 로드된 설정
    pub config: Arc<AppConfig>,

    /// 데이터베이스 연결 (설정되지 않으면 파일 기반으로 동작)
    pub db: Option<Database>,

    /// 가격 데이터 저장소 (데이터베이스가 있을 때만)
    pub prices: Option<PriceRepository>,

    /// 시세 다운로드 및 데이터셋 저장
    pub collector: DataCollector,

    /// 모델 학습/예측 서비스
    pub forecaster: Arc<ForecastService>,

    /// 액션 로그
    pub journal: Arc<ActionJournal>,

    /// 백그라운드 학습 작업
    pub training_jobs: Arc<RwLock<HashMap<Uuid, TrainingJob>>>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 데이터베이스 없이 상태를 생성합니다.
    pub fn new(config: AppConfig, provider: Arc<dyn PriceProvider>) -> Self {
        let collector = DataCollector::new(provider, DatasetStore::new(config.data.data_dir.clone()));
        let forecaster = ForecastService::new(config.model.clone());

        Self {
            config: Arc::new(config),
            db: None,
            prices: None,
            collector,
            forecaster: Arc::new(forecaster),
            journal: Arc::new(ActionJournal::default()),
            training_jobs: Arc::new(RwLock::new(HashMap::new())),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 데이터베이스를 연결합니다. 가격 데이터와 액션 로그가 테이블에도 저장됩니다.
    pub fn with_database(mut self, db: Database) -> Self {
        let pool = db.pool().clone();
        let prices = PriceRepository::new(pool.clone());
        self.collector = self.collector.with_repository(prices.clone());
        self.journal = Arc::new(ActionJournal::default().with_repository(ActionLogRepository::new(pool)));
        self.prices = Some(prices);
        self.db = Some(db);
        self
    }

    /// 요청 심볼을 정규화합니다. 비어 있으면 설정의 기본 심볼.
    pub fn resolve_symbol(&self, symbol: Option<&str>) -> String {
        match symbol.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_uppercase(),
            None => self.config.data.symbol.clone(),
        }
    }

    /// 수집 구간 `[start, end)`.
    pub fn history_range(&self) -> (NaiveDate, NaiveDate) {
        (self.config.data.start_date, self.config.data.effective_end_date())
    }

    /// 설정된 구간의 시세를 새로 내려받습니다.
    pub async fn collect(&self, symbol: &str) -> Result<CollectReport, DataError> {
        let (start, end) = self.history_range();
        let report = self.collector.collect(symbol, start, end).await?;
        record_collected_rows(symbol, report.rows);
        Ok(report)
    }

    /// 저장된 시세를 읽고, 없으면 먼저 내려받습니다.
    ///
    /// 데이터베이스가 연결되어 있으면 설정 구간의 행을 먼저 사용하고,
    /// 비어 있거나 조회에 실패하면 CSV 데이터셋으로 대신합니다.
    pub async fn load_history(&self, symbol: &str) -> Result<Vec<PriceBar>, DataError> {
        let (start, end) = self.history_range();

        if let Some(prices) = &self.prices {
            match prices.load_bars(symbol).await {
                Ok(bars) => {
                    let bars: Vec<PriceBar> = bars
                        .into_iter()
                        .filter(|b| b.date >= start && b.date < end)
                        .collect();
                    if !bars.is_empty() {
                        debug!(symbol, rows = bars.len(), "History loaded from database");
                        return Ok(bars);
                    }
                    debug!(symbol, "No rows in database, using dataset");
                }
                Err(e) => warn!(symbol, error = %e, "Failed to read price history, using dataset"),
            }
        }

        self.collector.load_or_collect(symbol, start, end).await
    }

    /// 데이터베이스 상태 확인. 연결이 없으면 false.
    pub async fn is_db_healthy(&self) -> bool {
        match &self.db {
            Some(db) => db.health_check().await.unwrap_or(false),
            None => false,
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// 테스트용 설정. 작은 모델과 임시 디렉토리를 사용합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config(root: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data.data_dir = root.join("data");
    config.data.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    config.data.end_date = NaiveDate::from_ymd_opt(2024, 12, 31);
    config.model.model_dir = root.join("models");
    config.model.sequence_length = 5;
    config.model.hidden_size = 4;
    config.model.num_layers = 1;
    config.model.epochs = 2;
    config.model.batch_size = 16;
    config.model.arima = forecast_core::ArimaOrder::new(2, 1, 0);
    config.model.seed = Some(42);
    config
}

/// 테스트용 AppState 생성.
///
/// 2024-01-01부터 하루 간격의 합성 종가 120개를 제공하는 제공자를 사용합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state(root: &std::path::Path) -> AppState {
    use forecast_data::StaticPriceProvider;

    let closes: Vec<f64> = (0..120)
        .map(|i| 40_000.0 + (i as f64 * 0.3).sin() * 500.0 + i as f64 * 10.0)
        .collect();
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let provider = StaticPriceProvider::from_closes(start, &closes);
    AppState::new(test_config(root), Arc::new(provider))
}
