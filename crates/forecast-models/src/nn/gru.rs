//! GRU 층.
//!
//! ```text
//! r = σ(x·Wxr + bxr + h·Whr + bhr)
//! z = σ(x·Wxz + bxz + h·Whz + bhz)
//! n = tanh(x·Wxn + bxn + r ⊙ (h·Whn + bhn))
//! h' = (1 - z) ⊙ n + z ⊙ h
//! ```
//! 게이트 가중치는 `[r | z | n]` 순서로 이어 붙여 저장합니다.

use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{sigmoid, Parameter, RecurrentCell};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruLayer {
    input_size: usize,
    hidden_size: usize,
    /// `[I, 3H]`
    w_x: Parameter,
    /// `[H, 3H]`
    w_h: Parameter,
    /// `[1, 3H]`
    b_x: Parameter,
    /// `[1, 3H]`
    b_h: Parameter,
}

#[derive(Debug)]
struct GruStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    r: Array2<f64>,
    z: Array2<f64>,
    n: Array2<f64>,
    /// `h·Whn + bhn`
    u_n: Array2<f64>,
}

#[derive(Debug, Default)]
pub struct GruCache {
    steps: Vec<GruStep>,
}

impl RecurrentCell for GruLayer {
    type Cache = GruCache;

    fn init(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = 1.0 / (hidden_size as f64).sqrt();
        Self {
            input_size,
            hidden_size,
            w_x: Parameter::uniform(input_size, 3 * hidden_size, limit, rng),
            w_h: Parameter::uniform(hidden_size, 3 * hidden_size, limit, rng),
            b_x: Parameter::zeros(1, 3 * hidden_size),
            b_h: Parameter::zeros(1, 3 * hidden_size),
        }
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn forward(&self, xs: &[Array2<f64>]) -> (Vec<Array2<f64>>, GruCache) {
        let h = self.hidden_size;
        let batch = match xs.first() {
            Some(x) => x.nrows(),
            None => return (Vec::new(), GruCache::default()),
        };

        let mut h_prev = Array2::<f64>::zeros((batch, h));
        let mut outputs = Vec::with_capacity(xs.len());
        let mut steps = Vec::with_capacity(xs.len());

        for x in xs {
            let mut a = x.dot(&self.w_x.value);
            a += &self.b_x.value;
            let mut u = h_prev.dot(&self.w_h.value);
            u += &self.b_h.value;

            let r = (&a.slice(s![.., 0..h]) + &u.slice(s![.., 0..h])).mapv(sigmoid);
            let z = (&a.slice(s![.., h..2 * h]) + &u.slice(s![.., h..2 * h])).mapv(sigmoid);
            let u_n = u.slice(s![.., 2 * h..]).to_owned();
            let n = (&a.slice(s![.., 2 * h..]) + &(&r * &u_n)).mapv(f64::tanh);

            // (1 - z) ⊙ n + z ⊙ h = n + z ⊙ (h - n)
            let h_next = &n + &(&z * &(&h_prev - &n));

            outputs.push(h_next.clone());
            steps.push(GruStep {
                x: x.clone(),
                h_prev,
                r,
                z,
                n,
                u_n,
            });
            h_prev = h_next;
        }

        (outputs, GruCache { steps })
    }

    fn backward(&mut self, cache: &GruCache, dhs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let h = self.hidden_size;
        let steps = &cache.steps;
        let batch = match steps.first() {
            Some(step) => step.x.nrows(),
            None => return Vec::new(),
        };

        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut d_a = Array2::<f64>::zeros((batch, 3 * h));
        let mut d_u = Array2::<f64>::zeros((batch, 3 * h));
        let mut dxs = vec![Array2::<f64>::zeros((batch, self.input_size)); steps.len()];

        for t in (0..steps.len()).rev() {
            let step = &steps[t];
            let dh = &dhs[t] + &dh_next;

            let dn = &dh * &step.z.mapv(|v| 1.0 - v);
            let dz = &dh * &(&step.h_prev - &step.n);
            let da_n = &dn * &step.n.mapv(|v| 1.0 - v * v);
            let dr = &da_n * &step.u_n;
            let du_n = &da_n * &step.r;
            let da_r = &dr * &step.r.mapv(|v| v * (1.0 - v));
            let da_z = &dz * &step.z.mapv(|v| v * (1.0 - v));

            d_a.slice_mut(s![.., 0..h]).assign(&da_r);
            d_a.slice_mut(s![.., h..2 * h]).assign(&da_z);
            d_a.slice_mut(s![.., 2 * h..]).assign(&da_n);

            d_u.slice_mut(s![.., 0..h]).assign(&da_r);
            d_u.slice_mut(s![.., h..2 * h]).assign(&da_z);
            d_u.slice_mut(s![.., 2 * h..]).assign(&du_n);

            self.w_x.grad += &step.x.t().dot(&d_a);
            self.b_x.grad += &d_a.sum_axis(Axis(0)).insert_axis(Axis(0));
            self.w_h.grad += &step.h_prev.t().dot(&d_u);
            self.b_h.grad += &d_u.sum_axis(Axis(0)).insert_axis(Axis(0));

            dxs[t] = d_a.dot(&self.w_x.value.t());
            dh_next = &dh * &step.z + d_u.dot(&self.w_h.value.t());
        }

        dxs
    }

    fn params(&self) -> Vec<&Parameter> {
        vec![&self.w_x, &self.w_h, &self.b_x, &self.b_h]
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.w_x, &mut self.w_h, &mut self.b_x, &mut self.b_h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = GruLayer::init(2, 3, &mut rng);
        let xs = vec![Array2::<f64>::from_elem((4, 2), 0.5); 6];

        let (outputs, cache) = layer.forward(&xs);
        assert_eq!(outputs.len(), 6);
        assert_eq!(outputs[0].dim(), (4, 3));
        assert_eq!(cache.steps.len(), 6);
    }

    #[test]
    fn test_empty_sequence() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = GruLayer::init(2, 3, &mut rng);
        let (outputs, cache) = layer.forward(&[]);
        assert!(outputs.is_empty());
        assert!(layer.backward(&cache, &[]).is_empty());
    }
}
