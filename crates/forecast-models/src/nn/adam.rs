//! Adam 옵티마이저.

use ndarray::{Array2, Zip};

use super::Parameter;

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// 누적된 그래디언트로 파라미터를 한 번 갱신합니다.
    ///
    /// 파라미터 순서는 호출마다 같아야 합니다.
    pub fn step(&mut self, params: Vec<&mut Parameter>) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.step = 0;
        }

        self.step += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let bias1 = 1.0 - b1.powi(self.step);
        let bias2 = 1.0 - b2.powi(self.step);
        let lr = self.learning_rate;

        for ((param, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            Zip::from(&mut param.value)
                .and(&param.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

/// 전역 L2 노름이 `max_norm`을 넘으면 모든 그래디언트를 같은 비율로 줄입니다.
///
/// 클리핑 전 노름을 반환합니다.
pub(crate) fn clip_grad_norm(params: &mut [&mut Parameter], max_norm: f64) -> f64 {
    let norm = params.iter().map(|p| p.grad_sq_norm()).sum::<f64>().sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / (norm + 1e-12);
        for p in params.iter_mut() {
            p.grad.mapv_inplace(|g| g * scale);
        }
    }
    norm
}
