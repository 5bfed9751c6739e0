//! 순환 신경망 구성 요소.
//!
//! 모든 텐서는 `[배치, 특징]` 2차원 배열이며 시퀀스는 시점별 배열의 슬라이스로 다룹니다.
//! 게이트 순서와 수식은 PyTorch의 `nn.LSTM`/`nn.GRU`와 같습니다.

mod adam;
mod dense;
mod gru;
mod lstm;
mod network;

pub use adam::Adam;
pub use dense::Dense;
pub use gru::{GruCache, GruLayer};
pub use lstm::{LstmCache, LstmLayer};
pub use network::{EpochStats, FitOptions, RecurrentNetwork};

use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 학습 가능한 가중치와 누적 그래디언트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Array2<f64>,
    #[serde(skip)]
    pub grad: Array2<f64>,
}

impl Parameter {
    pub fn new(value: Array2<f64>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { value, grad }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(Array2::zeros((rows, cols)))
    }

    /// `[-limit, limit]` 균등 분포로 초기화합니다.
    pub fn uniform(rows: usize, cols: usize, limit: f64, rng: &mut StdRng) -> Self {
        Self::new(Array2::random_using(
            (rows, cols),
            Uniform::new_inclusive(-limit, limit),
            rng,
        ))
    }

    /// 그래디언트를 0으로 초기화합니다. 역직렬화 직후처럼 모양이 다르면 다시 할당합니다.
    pub fn zero_grad(&mut self) {
        if self.grad.dim() == self.value.dim() {
            self.grad.fill(0.0);
        } else {
            self.grad = Array2::zeros(self.value.raw_dim());
        }
    }

    pub fn grad_sq_norm(&self) -> f64 {
        self.grad.iter().map(|g| g * g).sum()
    }
}

/// 시퀀스를 처리하는 순환층.
pub trait RecurrentCell: Clone + Send + Sync + Serialize + DeserializeOwned {
    /// 역전파에 필요한 순전파 중간값.
    type Cache;

    fn init(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self;

    fn input_size(&self) -> usize;

    fn hidden_size(&self) -> usize;

    /// 시점별 입력 `[B, I]`를 받아 시점별 은닉 상태 `[B, H]`를 반환합니다.
    fn forward(&self, xs: &[Array2<f64>]) -> (Vec<Array2<f64>>, Self::Cache);

    /// 시점별 은닉 상태 그래디언트를 받아 파라미터 그래디언트를 누적하고
    /// 시점별 입력 그래디언트를 반환합니다.
    fn backward(&mut self, cache: &Self::Cache, dhs: &[Array2<f64>]) -> Vec<Array2<f64>>;

    fn params(&self) -> Vec<&Parameter>;

    fn params_mut(&mut self) -> Vec<&mut Parameter>;
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
