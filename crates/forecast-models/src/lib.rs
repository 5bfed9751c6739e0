//! # Forecast Models
//!
//! 종가 시계열 예측 모델과 학습/추론 서비스.
//!
//! - [`scaler`]: Min-Max 정규화
//! - [`window`]: 슬라이딩 윈도우 시퀀스 생성과 시간순 분할
//! - [`nn`]: LSTM/GRU 순환 신경망 (BPTT, Adam)
//! - [`arima`]: ARIMA(p, d, q)
//! - [`artifact`]: 학습된 모델의 JSON 아티팩트 저장소
//! - [`service`]: 학습, 다일 예측, "없으면 학습" 경로를 묶은 서비스

pub mod arima;
pub mod artifact;
pub mod error;
pub mod evaluation;
pub mod nn;
pub mod scaler;
pub mod service;
pub mod window;

pub use arima::ArimaModel;
pub use artifact::{ArtifactStore, ModelArtifact, TrainedModel};
pub use error::{ModelError, Result};
pub use evaluation::TrainingMetrics;
pub use nn::{EpochStats, GruLayer, LstmLayer, RecurrentNetwork};
pub use scaler::MinMaxScaler;
pub use service::{ForecastService, ModelStatus, TrainingReport};
pub use window::{make_sequences, SequenceDataset};
