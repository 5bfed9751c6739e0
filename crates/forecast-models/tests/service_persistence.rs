//! 아티팩트 저장소를 공유하는 서비스 인스턴스 간 동작 테스트.

use forecast_core::{ArimaOrder, ModelKind, ModelSettings};
use forecast_models::{ForecastService, ModelError};

fn settings(dir: &std::path::Path) -> ModelSettings {
    ModelSettings {
        model_dir: dir.to_path_buf(),
        sequence_length: 6,
        hidden_size: 4,
        num_layers: 1,
        dropout: 0.0,
        epochs: 2,
        batch_size: 8,
        learning_rate: 0.01,
        train_ratio: 0.8,
        clip_norm: 5.0,
        arima: ArimaOrder::new(1, 1, 0),
        seed: Some(11),
    }
}

fn closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 20_000.0 + (i as f64 * 0.25).cos() * 300.0 + i as f64 * 15.0)
        .collect()
}

#[test]
fn test_restarted_service_reuses_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let closes = closes(90);

    let first = ForecastService::new(settings(dir.path()));
    for kind in ModelKind::ALL {
        first.train("SOL-USD", kind, &closes, &mut |_| {}).unwrap();
    }
    let expected: Vec<Vec<f64>> = ModelKind::ALL
        .iter()
        .map(|&kind| first.forecast("SOL-USD", kind, &closes, 4).unwrap())
        .collect();

    let restarted = ForecastService::new(settings(dir.path()));
    for (kind, expected) in ModelKind::ALL.iter().zip(&expected) {
        let forecast = restarted.forecast("SOL-USD", *kind, &closes, 4).unwrap();
        assert_eq!(forecast.len(), expected.len());
        for (a, b) in forecast.iter().zip(expected) {
            assert!((a - b).abs() <= 1e-6 * b.abs().max(1.0), "{} forecast changed after reload", kind);
        }
    }

    let stored = restarted.store().list().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|(symbol, _)| symbol == "SOL-USD"));
}

#[test]
fn test_symbols_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let service = ForecastService::new(settings(dir.path()));
    let closes = closes(60);

    service.train("BTC-USD", ModelKind::Arima, &closes, &mut |_| {}).unwrap();

    assert!(service.forecast("BTC-USD", ModelKind::Arima, &closes, 2).is_ok());
    let err = service
        .forecast("ETH-USD", ModelKind::Arima, &closes, 2)
        .unwrap_err();
    assert!(matches!(err, ModelError::NotTrained { ref symbol, .. } if symbol == "ETH-USD"));
}

#[test]
fn test_unsupported_artifact_version() {
    let dir = tempfile::tempdir().unwrap();
    let service = ForecastService::new(settings(dir.path()));
    let closes = closes(60);
    let report = service.train("BTC-USD", ModelKind::Gru, &closes, &mut |_| {}).unwrap();

    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report.path).unwrap()).unwrap();
    doc["version"] = serde_json::json!(99);
    std::fs::write(&report.path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let restarted = ForecastService::new(settings(dir.path()));
    let err = restarted
        .forecast("BTC-USD", ModelKind::Gru, &closes, 1)
        .unwrap_err();
    assert!(matches!(err, ModelError::Artifact(_)));

    let gru = restarted
        .status("BTC-USD")
        .into_iter()
        .find(|s| s.kind == ModelKind::Gru)
        .unwrap();
    assert!(!gru.trained);
    assert!(gru.error.unwrap().contains("version"));

    // 읽을 수 없는 아티팩트는 다시 학습된다
    let (forecast, report) = restarted
        .forecast_or_train("BTC-USD", ModelKind::Gru, &closes, 3)
        .unwrap();
    assert_eq!(forecast.len(), 3);
    assert!(report.is_some());
}

#[test]
fn test_concurrent_training_same_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let service = ForecastService::new(settings(dir.path()));
    let closes = closes(60);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    for _ in 0..5 {
                        service
                            .train("BTC-USD", ModelKind::Arima, &closes, &mut |_| {})
                            .unwrap();
                        service.forecast("BTC-USD", ModelKind::Arima, &closes, 2).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });

    // 모델 파일 하나만 남고 임시 파일은 없음
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert_eq!(
        service.store().list().unwrap(),
        vec![("BTC-USD".to_string(), ModelKind::Arima)]
    );
}
