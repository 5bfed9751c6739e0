//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `FORECAST__` 접두사 환경 변수 순서로 설정을 덮어씁니다.
//! 예: `FORECAST__MODEL__EPOCHS=50`, `FORECAST__DATA__SYMBOL=ETH-USD`.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::types::ArimaOrder;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 데이터 수집 설정
    pub data: DataConfig,
    /// 모델 학습 설정
    pub model: ModelSettings,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초). 학습 경로에는 적용되지 않습니다.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            request_timeout_secs: 30,
        }
    }
}

/// 데이터베이스 설정.
///
/// URL이 없으면 서비스는 데이터베이스 없이 파일 기반으로 동작합니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL 연결 URL
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// 설정된 URL, 없으면 `DATABASE_URL` 환경 변수를 반환합니다.
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .filter(|u| !u.trim().is_empty())
    }
}

/// 가격 데이터 수집 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// 기본 심볼 (Yahoo Finance 티커)
    pub symbol: String,
    /// 수집 시작일
    pub start_date: NaiveDate,
    /// 수집 종료일 (없으면 오늘)
    pub end_date: Option<NaiveDate>,
    /// CSV 데이터셋 디렉토리
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USD".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end_date: None,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl DataConfig {
    /// 실제 수집 종료일. 설정되지 않았으면 오늘(UTC)입니다.
    pub fn effective_end_date(&self) -> NaiveDate {
        self.end_date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// 모델 학습 하이퍼파라미터.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 학습된 모델 아티팩트 디렉토리
    pub model_dir: PathBuf,
    /// 입력 윈도우 길이
    pub sequence_length: usize,
    /// 순환층 은닉 크기
    pub hidden_size: usize,
    /// 순환층 개수
    pub num_layers: usize,
    /// 순환층 사이 드롭아웃 비율
    pub dropout: f64,
    /// 학습 에폭 수
    pub epochs: usize,
    /// 미니배치 크기
    pub batch_size: usize,
    /// Adam 학습률
    pub learning_rate: f64,
    /// 학습 구간 비율 (나머지는 검증)
    pub train_ratio: f64,
    /// 그래디언트 전역 노름 상한
    pub clip_norm: f64,
    /// ARIMA 차수
    pub arima: ArimaOrder,
    /// 가중치 초기화와 셔플 시드
    pub seed: Option<u64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            sequence_length: 60,
            hidden_size: 50,
            num_layers: 2,
            dropout: 0.2,
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.001,
            train_ratio: 0.8,
            clip_norm: 5.0,
            arima: ArimaOrder::default(),
            seed: None,
        }
    }
}

impl ModelSettings {
    /// 하이퍼파라미터 범위를 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        let positive = [
            ("sequence_length", self.sequence_length),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CoreError::Config(format!("model.{name} must be positive")));
            }
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(CoreError::Config(format!(
                "model.train_ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CoreError::Config(format!(
                "model.dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(CoreError::Config("model.learning_rate must be positive".into()));
        }
        Ok(())
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        Self::build(Some(path.as_ref()), true)
    }

    /// 기본 경로에서 설정을 로드합니다. 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::build(Some(Path::new(DEFAULT_CONFIG_PATH)), false)
    }

    /// 환경 변수만으로 설정을 로드합니다.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::build(None, false)
    }

    fn build(path: Option<&Path>, required: bool) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(required));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("FORECAST")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// 설정 전체를 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        self.model.validate()?;
        if self.data.symbol.trim().is_empty() {
            return Err(CoreError::Config("data.symbol must not be empty".into()));
        }
        if let Some(end) = self.data.end_date {
            if self.data.start_date > end {
                return Err(CoreError::Config(format!(
                    "data.start_date {} is after data.end_date {}",
                    self.data.start_date, end
                )));
            }
        }
        Ok(())
    }
}
