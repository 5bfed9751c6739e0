//! 슬라이딩 윈도우 시퀀스.

use ndarray::{s, Array2, Array3};

use crate::error::{ModelError, Result};

/// 순환 신경망 학습용 시퀀스 묶음.
///
/// `inputs`는 `[샘플, 시점, 1]`, `targets`는 `[샘플, 1]` 형태입니다.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    pub inputs: Array3<f64>,
    pub targets: Array2<f64>,
}

impl SequenceDataset {
    pub fn len(&self) -> usize {
        self.inputs.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_length(&self) -> usize {
        self.inputs.shape()[1]
    }

    /// 시간 순서를 유지한 채 학습/검증 구간으로 나눕니다.
    ///
    /// 검증 구간은 `ceil((1 - train_ratio) * N)`개이며 학습 구간에는 최소 한 개가 남습니다.
    pub fn split(&self, train_ratio: f64) -> (SequenceDataset, SequenceDataset) {
        let n = self.len();
        let ratio = train_ratio.clamp(0.0, 1.0);
        let n_test = ((1.0 - ratio) * n as f64 - 1e-9).ceil().max(0.0) as usize;
        let n_train = n.saturating_sub(n_test).max(1).min(n);

        let train = SequenceDataset {
            inputs: self.inputs.slice(s![..n_train, .., ..]).to_owned(),
            targets: self.targets.slice(s![..n_train, ..]).to_owned(),
        };
        let test = SequenceDataset {
            inputs: self.inputs.slice(s![n_train.., .., ..]).to_owned(),
            targets: self.targets.slice(s![n_train.., ..]).to_owned(),
        };
        (train, test)
    }
}

/// 시계열에서 `seq_len` 길이의 입력과 바로 다음 값을 타깃으로 하는 샘플을 만듭니다.
///
/// 샘플 수는 `series.len() - seq_len`입니다.
pub fn make_sequences(series: &[f64], seq_len: usize) -> Result<SequenceDataset> {
    if seq_len == 0 {
        return Err(ModelError::InvalidInput("sequence length must be positive".into()));
    }
    if series.len() <= seq_len {
        return Err(ModelError::InsufficientData {
            required: seq_len + 1,
            actual: series.len(),
        });
    }

    let n = series.len() - seq_len;
    let inputs = Array3::from_shape_fn((n, seq_len, 1), |(i, t, _)| series[i + t]);
    let targets = Array2::from_shape_fn((n, 1), |(i, _)| series[i + seq_len]);

    Ok(SequenceDataset { inputs, targets })
}

/// 단일 윈도우를 `[1, 시점, 1]` 입력으로 변환합니다.
pub fn window_tensor(window: &[f64]) -> Array3<f64> {
    Array3::from_shape_fn((1, window.len(), 1), |(_, t, _)| window[t])
}
