//! 학습된 모델 아티팩트.
//!
//! 모델 하나는 정규화 파라미터와 가중치를 함께 담은 JSON 파일 하나로 저장됩니다.
//! 파일 이름은 `<SYMBOL>_<kind>.json`입니다.

use chrono::{DateTime, Utc};
use forecast_core::{symbol_file_stem, ModelKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::arima::ArimaModel;
use crate::error::{ModelError, Result};
use crate::evaluation::TrainingMetrics;
use crate::nn::{GruLayer, LstmLayer, RecurrentNetwork};
use crate::scaler::MinMaxScaler;

/// 아티팩트 파일 형식 버전.
pub const ARTIFACT_VERSION: u32 = 1;

/// 종류별 학습된 모델과 전처리 상태.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrainedModel {
    Lstm {
        network: RecurrentNetwork<LstmLayer>,
        scaler: MinMaxScaler,
        sequence_length: usize,
    },
    Gru {
        network: RecurrentNetwork<GruLayer>,
        scaler: MinMaxScaler,
        sequence_length: usize,
    },
    Arima {
        model: ArimaModel,
        scaler: MinMaxScaler,
    },
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::Lstm { .. } => ModelKind::Lstm,
            TrainedModel::Gru { .. } => ModelKind::Gru,
            TrainedModel::Arima { .. } => ModelKind::Arima,
        }
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        match self {
            TrainedModel::Lstm { scaler, .. }
            | TrainedModel::Gru { scaler, .. }
            | TrainedModel::Arima { scaler, .. } => scaler,
        }
    }

    /// 예측에 필요한 최소 이력 길이.
    pub fn min_history(&self) -> usize {
        match self {
            TrainedModel::Lstm {
                sequence_length, ..
            }
            | TrainedModel::Gru {
                sequence_length, ..
            } => *sequence_length,
            TrainedModel::Arima { model, .. } => model.order().p + model.order().d + 1,
        }
    }
}

/// 디스크에 저장되는 모델 아티팩트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub kind: ModelKind,
    pub symbol: String,
    pub trained_at: DateTime<Utc>,
    pub metrics: TrainingMetrics,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(symbol: impl Into<String>, metrics: TrainingMetrics, model: TrainedModel) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            kind: model.kind(),
            symbol: symbol.into(),
            trained_at: Utc::now(),
            metrics,
            model,
        }
    }
}

/// 모델 아티팩트 파일 저장소.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, kind: ModelKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", symbol_file_stem(symbol), kind))
    }

    pub fn exists(&self, symbol: &str, kind: ModelKind) -> bool {
        self.path_for(symbol, kind).is_file()
    }

    /// 파일 수정 시각. 캐시 무효화에 사용합니다.
    pub fn modified(&self, symbol: &str, kind: ModelKind) -> Option<SystemTime> {
        fs::metadata(self.path_for(symbol, kind))
            .and_then(|m| m.modified())
            .ok()
    }

    /// 아티팩트를 저장합니다.
    ///
    /// 저장마다 고유한 임시 파일에 쓴 뒤 이름을 바꿔 교체하므로
    /// 동시에 저장해도 서로의 임시 파일을 덮어쓰지 않습니다.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&artifact.symbol, artifact.kind);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, artifact)?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(
            symbol = %artifact.symbol,
            kind = %artifact.kind,
            path = %path.display(),
            "Model artifact saved"
        );
        Ok(path)
    }

    /// 아티팩트를 읽습니다. 파일이 없으면 `None`.
    pub fn load(&self, symbol: &str, kind: ModelKind) -> Result<Option<ModelArtifact>> {
        let path = self.path_for(symbol, kind);
        if !path.is_file() {
            debug!(symbol, %kind, "No model artifact");
            return Ok(None);
        }

        let body = fs::read(&path)?;
        let artifact: ModelArtifact = serde_json::from_slice(&body).map_err(|e| {
            ModelError::Artifact(format!("{} is not a valid artifact: {}", path.display(), e))
        })?;

        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::Artifact(format!(
                "{}: unsupported artifact version {}",
                path.display(),
                artifact.version
            )));
        }
        if artifact.kind != kind || artifact.model.kind() != kind {
            return Err(ModelError::Artifact(format!(
                "{}: expected {} model, found {}",
                path.display(),
                kind,
                artifact.model.kind()
            )));
        }

        Ok(Some(artifact))
    }

    /// 아티팩트를 삭제합니다. 삭제했으면 true.
    pub fn remove(&self, symbol: &str, kind: ModelKind) -> Result<bool> {
        let path = self.path_for(symbol, kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 저장된 (심볼, 모델 종류) 목록.
    pub fn list(&self) -> Result<Vec<(String, ModelKind)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.rsplit_once('_').map(|(s, k)| (s, k.parse::<ModelKind>())) {
                Some((symbol, Ok(kind))) => found.push((symbol.to_string(), kind)),
                _ => warn!(path = %path.display(), "Ignoring unrecognised file in model directory"),
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::ArimaOrder;

    fn arima_artifact(symbol: &str) -> ModelArtifact {
        let series: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() + i as f64 * 0.01).collect();
        let (scaler, scaled) = MinMaxScaler::fit_transform(&series).unwrap();
        let model = ArimaModel::fit(&scaled, ArimaOrder::new(2, 1, 0)).unwrap();
        ModelArtifact::new(
            symbol,
            TrainingMetrics::default(),
            TrainedModel::Arima { model, scaler },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = arima_artifact("BTC-USD");

        assert!(store.load("BTC-USD", ModelKind::Arima).unwrap().is_none());
        let path = store.save(&artifact).unwrap();
        assert!(path.ends_with("BTC-USD_arima.json"));
        assert!(store.exists("btc-usd", ModelKind::Arima));
        assert!(!store.exists("BTC-USD", ModelKind::Lstm));
        assert!(store.modified("BTC-USD", ModelKind::Arima).is_some());

        let loaded = store.load("BTC-USD", ModelKind::Arima).unwrap().unwrap();
        assert_eq!(loaded.kind, ModelKind::Arima);
        assert_eq!(loaded.symbol, "BTC-USD");
        assert_eq!(loaded.model.min_history(), 4);
    }

    #[test]
    fn test_concurrent_saves_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = arima_artifact("BTC-USD");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        store.save(&artifact).unwrap();
                        assert!(store.load("BTC-USD", ModelKind::Arima).unwrap().is_some());
                    }
                });
            }
        });

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&arima_artifact("ETH-USD")).unwrap();

        // 다른 종류의 파일 이름으로 복사
        std::fs::copy(
            store.path_for("ETH-USD", ModelKind::Arima),
            store.path_for("ETH-USD", ModelKind::Gru),
        )
        .unwrap();
        let err = store.load("ETH-USD", ModelKind::Gru).unwrap_err();
        assert!(matches!(err, ModelError::Artifact(_)));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        std::fs::write(store.path_for("BTC-USD", ModelKind::Lstm), b"{not json").unwrap();
        assert!(store.load("BTC-USD", ModelKind::Lstm).is_err());
    }

    #[test]
    fn test_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        assert!(store.list().unwrap().is_empty());

        store.save(&arima_artifact("BTC-USD")).unwrap();
        store.save(&arima_artifact("ETH-USD")).unwrap();
        std::fs::write(dir.path().join("models").join("notes.txt"), "x").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec![
                ("BTC-USD".to_string(), ModelKind::Arima),
                ("ETH-USD".to_string(), ModelKind::Arima),
            ]
        );

        assert!(store.remove("BTC-USD", ModelKind::Arima).unwrap());
        assert!(!store.remove("BTC-USD", ModelKind::Arima).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
