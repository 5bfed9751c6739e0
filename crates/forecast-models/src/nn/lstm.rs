//! LSTM 층.
//!
//! ```text
//! i = σ(x·Wxi + h·Whi + bi)      f = σ(x·Wxf + h·Whf + bf)
//! g = tanh(x·Wxg + h·Whg + bg)   o = σ(x·Wxo + h·Who + bo)
//! c' = f ⊙ c + i ⊙ g             h' = o ⊙ tanh(c')
//! ```
//! 네 게이트의 가중치는 `[i | f | g | o]` 순서로 한 행렬에 이어 붙여 저장합니다.

use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{sigmoid, Parameter, RecurrentCell};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    /// `[I, 4H]`
    w_x: Parameter,
    /// `[H, 4H]`
    w_h: Parameter,
    /// `[1, 4H]`
    b: Parameter,
}

/// 한 시점의 순전파 중간값.
#[derive(Debug)]
struct LstmStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug, Default)]
pub struct LstmCache {
    steps: Vec<LstmStep>,
}

impl RecurrentCell for LstmLayer {
    type Cache = LstmCache;

    fn init(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = 1.0 / (hidden_size as f64).sqrt();
        let mut b = Parameter::zeros(1, 4 * hidden_size);
        // forget 게이트 편향을 1로 두어 초기 기억 유지
        b.value
            .slice_mut(s![.., hidden_size..2 * hidden_size])
            .fill(1.0);

        Self {
            input_size,
            hidden_size,
            w_x: Parameter::uniform(input_size, 4 * hidden_size, limit, rng),
            w_h: Parameter::uniform(hidden_size, 4 * hidden_size, limit, rng),
            b,
        }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn forward(&self, xs: &[Array2<f64>]) -> (Vec<Array2<f64>>, LstmCache) {
        let h = self.hidden_size;
        let batch = match xs.first() {
            Some(x) => x.nrows(),
            None => return (Vec::new(), LstmCache::default()),
        };

        let mut h_prev = Array2::<f64>::zeros((batch, h));
        let mut c_prev = Array2::<f64>::zeros((batch, h));
        let mut outputs = Vec::with_capacity(xs.len());
        let mut steps = Vec::with_capacity(xs.len());

        for x in xs {
            let mut z = x.dot(&self.w_x.value) + h_prev.dot(&self.w_h.value);
            z += &self.b.value;

            let i = z.slice(s![.., 0..h]).mapv(sigmoid);
            let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * h..]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            outputs.push(h_next.clone());
            steps.push(LstmStep {
                x: x.clone(),
                h_prev,
                c_prev,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h_prev = h_next;
            c_prev = c;
        }

        (outputs, LstmCache { steps })
    }

    fn backward(&mut self, cache: &LstmCache, dhs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let h = self.hidden_size;
        let steps = &cache.steps;
        let batch = match steps.first() {
            Some(step) => step.x.nrows(),
            None => return Vec::new(),
        };

        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));
        let mut dz = Array2::<f64>::zeros((batch, 4 * h));
        let mut dxs = vec![Array2::<f64>::zeros((batch, self.input_size)); steps.len()];

        for t in (0..steps.len()).rev() {
            let step = &steps[t];
            let dh = &dhs[t] + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));
            let di = &dc * &step.g;
            let dg = &dc * &step.i;
            let df = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            dz.slice_mut(s![.., 0..h])
                .assign(&(&di * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., h..2 * h])
                .assign(&(&df * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * h..3 * h])
                .assign(&(&dg * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * h..])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            self.w_x.grad += &step.x.t().dot(&dz);
            self.w_h.grad += &step.h_prev.t().dot(&dz);
            self.b.grad += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            dxs[t] = dz.dot(&self.w_x.value.t());
            dh_next = dz.dot(&self.w_h.value.t());
        }

        dxs
    }

    fn params(&self) -> Vec<&Parameter> {
        vec![&self.w_x, &self.w_h, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.w_x, &mut self.w_h, &mut self.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::init(3, 5, &mut rng);
        let xs = vec![Array2::<f64>::ones((2, 3)); 4];

        let (outputs, cache) = layer.forward(&xs);
        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs[3].dim(), (2, 5));
        assert_eq!(cache.steps.len(), 4);
        // 은닉 상태는 tanh와 시그모이드 곱이므로 (-1, 1) 범위
        assert!(outputs.iter().flatten().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_forget_bias_initialized_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::init(1, 4, &mut rng);
        assert!(layer.b.value.slice(s![.., 4..8]).iter().all(|&v| v == 1.0));
        assert!(layer.b.value.slice(s![.., 0..4]).iter().all(|&v| v == 0.0));
    }
}
