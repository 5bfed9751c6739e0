//! 선형 출력층.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::Parameter;

/// `y = x · W + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    weight: Parameter,
    bias: Parameter,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        let limit = 1.0 / (input_size as f64).sqrt();
        Self {
            weight: Parameter::uniform(input_size, output_size, limit, rng),
            bias: Parameter::zeros(1, output_size),
        }
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut y = x.dot(&self.weight.value);
        y += &self.bias.value;
        y
    }

    /// 입력 `x`와 출력 그래디언트 `dy`로 입력 그래디언트를 계산합니다.
    pub fn backward(&mut self, x: &Array2<f64>, dy: &Array2<f64>) -> Array2<f64> {
        self.weight.grad += &x.t().dot(dy);
        self.bias.grad += &dy.sum_axis(Axis(0)).insert_axis(Axis(0));
        dy.dot(&self.weight.value.t())
    }

    pub fn params(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    pub fn params_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }
}
