//! 학습과 예측을 묶은 예측 서비스.
//!
//! 학습된 모델은 [`ArtifactStore`]에 저장되고 메모리에 캐시됩니다.
//! 캐시 항목은 파일 수정 시각이 바뀌면 다시 읽습니다.
//!
//! 모든 연산은 동기 CPU 작업이므로 비동기 런타임에서는
//! `spawn_blocking` 안에서 호출해야 합니다.

use chrono::{DateTime, Utc};
use forecast_core::{symbol_file_stem, ModelKind, ModelSettings};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, instrument, warn};

use crate::arima::ArimaModel;
use crate::artifact::{ArtifactStore, ModelArtifact, TrainedModel};
use crate::error::{ModelError, Result};
use crate::evaluation::{mae, rmse, TrainingMetrics};
use crate::nn::{EpochStats, FitOptions, GruLayer, LstmLayer, RecurrentCell, RecurrentNetwork};
use crate::scaler::MinMaxScaler;
use crate::window::{make_sequences, window_tensor};

/// 학습 한 번의 결과.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct TrainingReport {
    pub symbol: String,
    pub kind: ModelKind,
    pub trained_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub metrics: TrainingMetrics,
    /// 에폭별 손실 (ARIMA는 비어 있음)
    pub history: Vec<EpochStats>,
    #[cfg_attr(feature = "utoipa-support", schema(value_type = String))]
    pub path: PathBuf,
}

/// 모델 종류별 학습 상태.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ModelStatus {
    pub kind: ModelKind,
    pub trained: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub metrics: Option<TrainingMetrics>,
    /// 아티팩트를 읽지 못한 경우의 사유
    pub error: Option<String>,
}

struct CachedArtifact {
    modified: SystemTime,
    artifact: Arc<ModelArtifact>,
}

type CacheKey = (String, ModelKind);

/// 모델 학습, 저장, 예측 서비스.
pub struct ForecastService {
    settings: ModelSettings,
    store: ArtifactStore,
    cache: RwLock<HashMap<CacheKey, CachedArtifact>>,
}

impl ForecastService {
    pub fn new(settings: ModelSettings) -> Self {
        let store = ArtifactStore::new(settings.model_dir.clone());
        Self {
            settings,
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// 종가 시계열로 모델을 학습하고 아티팩트를 저장합니다.
    ///
    /// 순환 신경망은 에폭마다 `on_epoch`를 호출합니다.
    #[instrument(skip(self, closes, on_epoch), fields(samples = closes.len()))]
    pub fn train(
        &self,
        symbol: &str,
        kind: ModelKind,
        closes: &[f64],
        on_epoch: &mut dyn FnMut(&EpochStats),
    ) -> Result<TrainingReport> {
        self.settings
            .validate()
            .map_err(|e| ModelError::InvalidInput(e.to_string()))?;
        check_finite(closes)?;

        let started = Instant::now();
        let seq_len = self.settings.sequence_length;
        let (model, metrics, history) = match kind {
            ModelKind::Lstm => {
                let (network, scaler, metrics, history) =
                    self.train_recurrent::<LstmLayer>(closes, on_epoch)?;
                let model = TrainedModel::Lstm {
                    network,
                    scaler,
                    sequence_length: seq_len,
                };
                (model, metrics, history)
            }
            ModelKind::Gru => {
                let (network, scaler, metrics, history) =
                    self.train_recurrent::<GruLayer>(closes, on_epoch)?;
                let model = TrainedModel::Gru {
                    network,
                    scaler,
                    sequence_length: seq_len,
                };
                (model, metrics, history)
            }
            ModelKind::Arima => {
                let (model, scaler, metrics) = self.train_arima(closes)?;
                (TrainedModel::Arima { model, scaler }, metrics, Vec::new())
            }
        };

        let artifact = ModelArtifact::new(symbol, metrics.clone(), model);
        let path = self.store.save(&artifact)?;
        let trained_at = artifact.trained_at;
        self.cache_put(symbol, kind, artifact);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            symbol,
            %kind,
            duration_ms,
            validation_rmse = ?metrics.validation_rmse,
            "Model trained"
        );

        Ok(TrainingReport {
            symbol: symbol.to_string(),
            kind,
            trained_at,
            duration_ms,
            metrics,
            history,
            path,
        })
    }

    fn train_recurrent<C: RecurrentCell>(
        &self,
        closes: &[f64],
        on_epoch: &mut dyn FnMut(&EpochStats),
    ) -> Result<(RecurrentNetwork<C>, MinMaxScaler, TrainingMetrics, Vec<EpochStats>)> {
        let s = &self.settings;
        let (scaler, scaled) = MinMaxScaler::fit_transform(closes)?;
        let dataset = make_sequences(&scaled, s.sequence_length)?;
        let (train, test) = dataset.split(s.train_ratio);

        let mut rng = seeded_rng(s.seed);
        let mut network =
            RecurrentNetwork::<C>::new(1, s.hidden_size, s.num_layers, s.dropout, &mut rng)?;
        let options = FitOptions {
            epochs: s.epochs,
            batch_size: s.batch_size,
            learning_rate: s.learning_rate,
            clip_norm: s.clip_norm,
            seed: s.seed,
        };
        let history = network.fit(&train, Some(&test), &options, |stats| on_epoch(stats))?;

        let (validation_rmse, validation_mae) = if test.is_empty() {
            (None, None)
        } else {
            let predicted: Vec<f64> = network
                .predict(&test.inputs.view())?
                .iter()
                .map(|v| scaler.inverse_one(*v))
                .collect();
            let actual: Vec<f64> = test
                .targets
                .column(0)
                .iter()
                .map(|v| scaler.inverse_one(*v))
                .collect();
            (rmse(&predicted, &actual), mae(&predicted, &actual))
        };

        let metrics = TrainingMetrics {
            train_samples: train.len(),
            test_samples: test.len(),
            epochs: history.len(),
            final_train_loss: history.last().map(|h| h.train_loss),
            validation_rmse,
            validation_mae,
            aic: None,
        };
        Ok((network, scaler, metrics, history))
    }

    /// ARIMA는 학습 구간으로 한 단계 예측 오차를 구한 뒤 전체 구간으로 다시 적합합니다.
    fn train_arima(&self, closes: &[f64]) -> Result<(ArimaModel, MinMaxScaler, TrainingMetrics)> {
        let order = self.settings.arima;
        let (scaler, scaled) = MinMaxScaler::fit_transform(closes)?;
        let n = scaled.len();
        let n_test = ((1.0 - self.settings.train_ratio) * n as f64 - 1e-9).ceil().max(0.0) as usize;
        let n_train = n.saturating_sub(n_test);

        let (validation_rmse, validation_mae, train_samples, test_samples) =
            if n_test > 0 && n_train >= order.min_observations() {
                let model = ArimaModel::fit(&scaled[..n_train], order)?;
                let mut predicted = Vec::with_capacity(n_test);
                for t in n_train..n {
                    let next = model.forecast(&scaled[..t], 1)?;
                    predicted.push(scaler.inverse_one(next[0]));
                }
                let actual = &closes[n_train..];
                (rmse(&predicted, actual), mae(&predicted, actual), n_train, n_test)
            } else {
                debug!(n, "Series too short for a hold-out evaluation");
                (None, None, n, 0)
            };

        let model = ArimaModel::fit(&scaled, order)?;
        let metrics = TrainingMetrics {
            train_samples,
            test_samples,
            epochs: 0,
            final_train_loss: Some(model.sigma2()),
            validation_rmse,
            validation_mae,
            aic: Some(model.aic()),
        };
        Ok((model, scaler, metrics))
    }

    /// 저장된 모델로 `closes` 이후 `steps`일의 종가를 예측합니다.
    #[instrument(skip(self, closes), fields(history = closes.len()))]
    pub fn forecast(&self, symbol: &str, kind: ModelKind, closes: &[f64], steps: usize) -> Result<Vec<f64>> {
        if steps == 0 {
            return Err(ModelError::InvalidInput("forecast horizon must be positive".into()));
        }
        check_finite(closes)?;

        let artifact = self.artifact(symbol, kind)?.ok_or_else(|| ModelError::NotTrained {
            symbol: symbol.to_string(),
            kind,
        })?;
        forecast_with(&artifact.model, closes, steps)
    }

    /// 다음 하루의 종가 예측.
    pub fn predict_next(&self, symbol: &str, kind: ModelKind, closes: &[f64]) -> Result<f64> {
        let forecast = self.forecast(symbol, kind, closes, 1)?;
        forecast
            .first()
            .copied()
            .ok_or_else(|| ModelError::Numerical("empty forecast".into()))
    }

    /// 예측하되 아티팩트가 없거나 읽을 수 없으면 먼저 학습합니다.
    ///
    /// 학습이 일어났으면 학습 결과도 함께 반환합니다.
    pub fn forecast_or_train(
        &self,
        symbol: &str,
        kind: ModelKind,
        closes: &[f64],
        steps: usize,
    ) -> Result<(Vec<f64>, Option<TrainingReport>)> {
        match self.forecast(symbol, kind, closes, steps) {
            Ok(forecast) => Ok((forecast, None)),
            Err(err @ (ModelError::NotTrained { .. } | ModelError::Artifact(_))) => {
                if let ModelError::Artifact(reason) = &err {
                    warn!(symbol, %kind, reason = %reason, "Unusable model artifact, retraining");
                } else {
                    info!(symbol, %kind, "Model artifact missing, training");
                }
                let report = self.train(symbol, kind, closes, &mut |_| {})?;
                let forecast = self.forecast(symbol, kind, closes, steps)?;
                Ok((forecast, Some(report)))
            }
            Err(e) => Err(e),
        }
    }

    /// 모든 모델 종류를 다시 학습합니다.
    pub fn retrain_all(&self, symbol: &str, closes: &[f64]) -> Result<Vec<TrainingReport>> {
        ModelKind::ALL
            .iter()
            .map(|kind| self.train(symbol, *kind, closes, &mut |_| {}))
            .collect()
    }

    /// 심볼의 모델 종류별 학습 상태.
    pub fn status(&self, symbol: &str) -> Vec<ModelStatus> {
        ModelKind::ALL
            .iter()
            .map(|&kind| match self.artifact(symbol, kind) {
                Ok(Some(artifact)) => ModelStatus {
                    kind,
                    trained: true,
                    trained_at: Some(artifact.trained_at),
                    metrics: Some(artifact.metrics.clone()),
                    error: None,
                },
                Ok(None) => ModelStatus {
                    kind,
                    trained: false,
                    trained_at: None,
                    metrics: None,
                    error: None,
                },
                Err(e) => ModelStatus {
                    kind,
                    trained: false,
                    trained_at: None,
                    metrics: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }

    /// 캐시 또는 파일에서 아티팩트를 가져옵니다.
    fn artifact(&self, symbol: &str, kind: ModelKind) -> Result<Option<Arc<ModelArtifact>>> {
        let key = cache_key(symbol, kind);
        let Some(modified) = self.store.modified(symbol, kind) else {
            self.cache.write().unwrap_or_else(|e| e.into_inner()).remove(&key);
            return Ok(None);
        };

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&key) {
                if entry.modified == modified {
                    return Ok(Some(Arc::clone(&entry.artifact)));
                }
            }
        }

        let Some(artifact) = self.store.load(symbol, kind)? else {
            return Ok(None);
        };
        debug!(symbol, %kind, "Model artifact loaded from disk");
        let artifact = Arc::new(artifact);
        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            CachedArtifact {
                modified,
                artifact: Arc::clone(&artifact),
            },
        );
        Ok(Some(artifact))
    }

    fn cache_put(&self, symbol: &str, kind: ModelKind, artifact: ModelArtifact) {
        let Some(modified) = self.store.modified(symbol, kind) else {
            return;
        };
        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            cache_key(symbol, kind),
            CachedArtifact {
                modified,
                artifact: Arc::new(artifact),
            },
        );
    }
}

fn cache_key(symbol: &str, kind: ModelKind) -> CacheKey {
    (symbol_file_stem(symbol), kind)
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn check_finite(closes: &[f64]) -> Result<()> {
    match closes.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ModelError::InvalidInput(format!(
            "close price at index {} is not finite",
            i
        ))),
        None => Ok(()),
    }
}

/// 학습된 모델로 다일 예측을 수행합니다. 결과는 원래 가격 단위입니다.
pub fn forecast_with(model: &TrainedModel, closes: &[f64], steps: usize) -> Result<Vec<f64>> {
    let required = model.min_history();
    if closes.len() < required {
        return Err(ModelError::InsufficientData {
            required,
            actual: closes.len(),
        });
    }

    let scaled = match model {
        TrainedModel::Lstm {
            network,
            scaler,
            sequence_length,
        } => roll_forward(network, &scaler.transform(&closes[closes.len() - sequence_length..]), steps)?,
        TrainedModel::Gru {
            network,
            scaler,
            sequence_length,
        } => roll_forward(network, &scaler.transform(&closes[closes.len() - sequence_length..]), steps)?,
        TrainedModel::Arima { model, scaler } => model.forecast(&scaler.transform(closes), steps)?,
    };
    Ok(model.scaler().inverse_transform(&scaled))
}

/// 예측값을 윈도우 끝에 붙이며 한 단계씩 진행합니다.
fn roll_forward<C: RecurrentCell>(
    network: &RecurrentNetwork<C>,
    window: &[f64],
    steps: usize,
) -> Result<Vec<f64>> {
    let mut window = window.to_vec();
    let mut predictions = Vec::with_capacity(steps);
    for _ in 0..steps {
        let input = window_tensor(&window);
        let next = network
            .predict(&input.view())?
            .first()
            .copied()
            .ok_or_else(|| ModelError::Numerical("network returned no prediction".into()))?;
        if !next.is_finite() {
            return Err(ModelError::Numerical("recurrent forecast is not finite".into()));
        }
        predictions.push(next);
        window.rotate_left(1);
        if let Some(last) = window.last_mut() {
            *last = next;
        }
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::ArimaOrder;

    fn tiny_settings(dir: &std::path::Path) -> ModelSettings {
        ModelSettings {
            model_dir: dir.to_path_buf(),
            sequence_length: 5,
            hidden_size: 4,
            num_layers: 2,
            dropout: 0.1,
            epochs: 2,
            batch_size: 8,
            learning_rate: 0.01,
            train_ratio: 0.8,
            clip_norm: 5.0,
            arima: ArimaOrder::new(2, 1, 0),
            seed: Some(7),
        }
    }

    fn series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.4).sin() * 5.0 + i as f64 * 0.2)
            .collect()
    }

    #[test]
    fn test_forecast_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let err = service
            .forecast("BTC-USD", ModelKind::Lstm, &series(30), 3)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotTrained { kind: ModelKind::Lstm, .. }));
    }

    #[test]
    fn test_train_and_forecast_recurrent() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(60);

        for kind in [ModelKind::Lstm, ModelKind::Gru] {
            let mut epochs_seen = 0;
            let report = service
                .train("BTC-USD", kind, &closes, &mut |_| epochs_seen += 1)
                .unwrap();
            assert_eq!(epochs_seen, 2);
            assert_eq!(report.history.len(), 2);
            assert_eq!(report.metrics.train_samples + report.metrics.test_samples, 55);
            assert_eq!(report.metrics.test_samples, 11);
            assert!(report.metrics.validation_rmse.unwrap() >= 0.0);
            assert!(report.path.is_file());

            let forecast = service.forecast("BTC-USD", kind, &closes, 5).unwrap();
            assert_eq!(forecast.len(), 5);
            assert!(forecast.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_train_and_forecast_arima() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(80);

        let report = service.train("BTC-USD", ModelKind::Arima, &closes, &mut |_| {}).unwrap();
        assert!(report.history.is_empty());
        assert_eq!(report.metrics.test_samples, 16);
        assert!(report.metrics.aic.is_some());
        assert!(report.metrics.validation_mae.is_some());

        let next = service.predict_next("BTC-USD", ModelKind::Arima, &closes).unwrap();
        // 부드러운 시계열이므로 마지막 값 근처
        assert!((next - closes[79]).abs() < 10.0, "next = {}", next);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let closes = series(50);
        let run = || {
            let dir = tempfile::tempdir().unwrap();
            let service = ForecastService::new(tiny_settings(dir.path()));
            service.train("ETH-USD", ModelKind::Gru, &closes, &mut |_| {}).unwrap();
            service.forecast("ETH-USD", ModelKind::Gru, &closes, 3).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_forecast_or_train_trains_once() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(40);

        let (first, report) = service
            .forecast_or_train("BTC-USD", ModelKind::Lstm, &closes, 1)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(report.is_some());

        let (second, report) = service
            .forecast_or_train("BTC-USD", ModelKind::Lstm, &closes, 1)
            .unwrap();
        assert!(report.is_none());
        assert_eq!(first, second);
    }

    #[test]
    fn test_removed_artifact_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(40);

        service.train("BTC-USD", ModelKind::Arima, &closes, &mut |_| {}).unwrap();
        assert!(service.forecast("BTC-USD", ModelKind::Arima, &closes, 2).is_ok());

        service.store().remove("BTC-USD", ModelKind::Arima).unwrap();
        let err = service
            .forecast("BTC-USD", ModelKind::Arima, &closes, 2)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotTrained { .. }));
    }

    #[test]
    fn test_short_history_and_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(40);
        service.train("BTC-USD", ModelKind::Lstm, &closes, &mut |_| {}).unwrap();

        let err = service
            .forecast("BTC-USD", ModelKind::Lstm, &closes[..3], 1)
            .unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { required: 5, actual: 3 }));

        assert!(service.forecast("BTC-USD", ModelKind::Lstm, &closes, 0).is_err());

        let mut broken = closes.clone();
        broken[10] = f64::NAN;
        assert!(service.train("BTC-USD", ModelKind::Gru, &broken, &mut |_| {}).is_err());
        assert!(service.train("BTC-USD", ModelKind::Gru, &closes[..5], &mut |_| {}).is_err());
    }

    #[test]
    fn test_retrain_all_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));

        let status = service.status("BTC-USD");
        assert_eq!(status.len(), 3);
        assert!(status.iter().all(|s| !s.trained && s.error.is_none()));

        let reports = service.retrain_all("BTC-USD", &series(40)).unwrap();
        assert_eq!(
            reports.iter().map(|r| r.kind).collect::<Vec<_>>(),
            ModelKind::ALL.to_vec()
        );

        let status = service.status("btc-usd");
        assert!(status.iter().all(|s| s.trained && s.trained_at.is_some()));
    }

    #[test]
    fn test_corrupt_artifact_is_retrained() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(tiny_settings(dir.path()));
        let closes = series(40);
        std::fs::write(service.store().path_for("BTC-USD", ModelKind::Arima), b"garbage").unwrap();

        let status = service.status("BTC-USD");
        assert!(status[2].error.is_some());

        let (_, report) = service
            .forecast_or_train("BTC-USD", ModelKind::Arima, &closes, 1)
            .unwrap();
        assert!(report.is_some());
    }
}
