//! ARIMA(p, d, q) 모델.
//!
//! `d`번 차분한 시계열에 ARMA(p, q)를 적합합니다.
//! - q = 0: 상수항을 포함한 OLS 자기회귀
//! - p = 0, q > 0: 반복 잔차 회귀 (잔차 재계산과 회귀를 수렴할 때까지 반복)
//! - p > 0, q > 0: Hannan-Rissanen 2단계 추정 (장기 AR 잔차를 MA 회귀변수로 사용)
//!
//! 예측은 조건부 제곱합(CSS) 잔차로 재귀 계산한 뒤 차분을 되돌립니다.

use forecast_core::ArimaOrder;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};

/// 순수 MA 적합의 최대 반복 횟수.
const MA_MAX_ITERATIONS: usize = 50;

/// 계수 변화가 이보다 작으면 수렴으로 봅니다.
const MA_TOLERANCE: f64 = 1e-8;

/// 적합된 ARIMA 모델.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaModel {
    order: ArimaOrder,
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    aic: f64,
    bic: f64,
    n_obs: usize,
}

impl ArimaModel {
    /// 시계열에 모델을 적합합니다.
    pub fn fit(data: &[f64], order: ArimaOrder) -> Result<Self> {
        let required = order.min_observations();
        if data.len() < required {
            return Err(ModelError::InsufficientData {
                required,
                actual: data.len(),
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidInput("series contains non-finite values".into()));
        }

        let w = difference(data, order.d);
        let (constant, ar, ma) = match (order.p, order.q) {
            (p, 0) => fit_autoregression(&w, p)?,
            (0, q) => fit_moving_average(&w, q)?,
            (p, q) => fit_hannan_rissanen(&w, p, q)?,
        };

        let mut model = Self {
            order,
            constant,
            ar,
            ma,
            sigma2: 0.0,
            aic: 0.0,
            bic: 0.0,
            n_obs: w.len(),
        };

        let residuals = model.css_residuals(&w);
        let effective = &residuals[order.p.min(residuals.len())..];
        let n = effective.len().max(1) as f64;
        let sigma2 = (effective.iter().map(|e| e * e).sum::<f64>() / n).max(1e-12);
        let k = (order.p + order.q + 1) as f64;
        let log_likelihood = -0.5 * n * (1.0 + (2.0 * std::f64::consts::PI * sigma2).ln());

        model.sigma2 = sigma2;
        model.aic = -2.0 * log_likelihood + 2.0 * k;
        model.bic = -2.0 * log_likelihood + k * n.ln();

        debug!(
            order = %order,
            constant = model.constant,
            ar = ?model.ar,
            ma = ?model.ma,
            sigma2,
            aic = model.aic,
            "ARIMA fitted"
        );

        Ok(model)
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// 잔차 분산.
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// 적합에 사용한 차분 후 관측치 수.
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// 차분된 시계열의 CSS 잔차. 처음 p개는 0입니다.
    fn css_residuals(&self, w: &[f64]) -> Vec<f64> {
        let p = self.ar.len();
        let mut residuals = vec![0.0; w.len()];
        for t in p..w.len() {
            let predicted = self.one_step(w, &residuals, t);
            residuals[t] = w[t] - predicted;
        }
        residuals
    }

    /// 시점 `t`의 한 단계 예측 (t 이전 값만 사용).
    fn one_step(&self, w: &[f64], residuals: &[f64], t: usize) -> f64 {
        let ar: f64 = self
            .ar
            .iter()
            .enumerate()
            .filter(|(i, _)| t > *i)
            .map(|(i, phi)| phi * w[t - i - 1])
            .sum();
        let ma: f64 = self
            .ma
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, theta)| theta * residuals[t - j - 1])
            .sum();
        self.constant + ar + ma
    }

    /// `history` 이후 `steps`개 시점을 원래 척도로 예측합니다.
    pub fn forecast(&self, history: &[f64], steps: usize) -> Result<Vec<f64>> {
        let required = self.order.p + self.order.d + 1;
        if history.len() < required {
            return Err(ModelError::InsufficientData {
                required,
                actual: history.len(),
            });
        }

        // 각 차분 단계의 마지막 값을 보관했다가 역차분에 사용
        let mut last_values = Vec::with_capacity(self.order.d);
        let mut w = history.to_vec();
        for _ in 0..self.order.d {
            last_values.push(w[w.len() - 1]);
            w = difference(&w, 1);
        }

        let mut residuals = self.css_residuals(&w);
        let mut predictions = Vec::with_capacity(steps);
        for _ in 0..steps {
            let t = w.len();
            let next = self.one_step(&w, &residuals, t);
            w.push(next);
            residuals.push(0.0);
            predictions.push(next);
        }

        for last in last_values.into_iter().rev() {
            let mut level = last;
            for value in predictions.iter_mut() {
                level += *value;
                *value = level;
            }
        }

        if predictions.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Numerical("ARIMA forecast is not finite".into()));
        }
        Ok(predictions)
    }
}

/// 시계열을 `d`번 차분합니다.
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// 상수항 + AR(p)를 OLS로 적합합니다.
fn fit_autoregression(w: &[f64], p: usize) -> Result<(f64, Vec<f64>, Vec<f64>)> {
    if p == 0 {
        let mean = w.iter().sum::<f64>() / w.len().max(1) as f64;
        return Ok((mean, Vec::new(), Vec::new()));
    }
    let coefficients = ar_regression(w, p)?;
    Ok((coefficients[0], coefficients[1..].to_vec(), Vec::new()))
}

/// `[1, w(t-1), …, w(t-p)]` 회귀 계수. 첫 번째가 상수항입니다.
fn ar_regression(w: &[f64], p: usize) -> Result<Vec<f64>> {
    let n = w.len();
    if n < 2 * p + 2 {
        return Err(ModelError::InsufficientData {
            required: 2 * p + 2,
            actual: n,
        });
    }

    let rows = n - p;
    let mut design = Vec::with_capacity(rows * (p + 1));
    for t in p..n {
        design.push(1.0);
        design.extend((1..=p).map(|i| w[t - i]));
    }
    least_squares(rows, p + 1, &design, &w[p..])
}

/// 상수항 + MA(q)를 반복 잔차 회귀로 적합합니다.
///
/// 평균 편차를 첫 잔차로 두고, `[1, e(t-1), …, e(t-q)]` 회귀와 CSS 잔차
/// 재계산을 번갈아 수행합니다. 잔차 재귀가 발산하면 직전 추정을 유지합니다.
fn fit_moving_average(w: &[f64], q: usize) -> Result<(f64, Vec<f64>, Vec<f64>)> {
    let n = w.len();
    let cols = q + 1;
    if n < q + cols + 1 {
        return Err(ModelError::InsufficientData {
            required: q + cols + 1,
            actual: n,
        });
    }

    let mean = w.iter().sum::<f64>() / n as f64;
    let scale = w.iter().map(|v| (v - mean).abs()).fold(0.0, f64::max) + 1.0;
    let mut beta = vec![0.0; cols];
    beta[0] = mean;
    let mut residuals: Vec<f64> = w.iter().map(|v| v - mean).collect();

    let rows = n - q;
    for iteration in 1..=MA_MAX_ITERATIONS {
        let mut design = Vec::with_capacity(rows * cols);
        for t in q..n {
            design.push(1.0);
            design.extend((1..=q).map(|j| residuals[t - j]));
        }
        let next = least_squares(rows, cols, &design, &w[q..])?;

        let next_residuals = ma_residuals(w, next[0], &next[1..]);
        if next_residuals
            .iter()
            .any(|e| !e.is_finite() || e.abs() > scale * 1e6)
        {
            debug!(iteration, "MA residual recursion diverged, keeping previous estimate");
            break;
        }

        let change = next
            .iter()
            .zip(&beta)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        beta = next;
        residuals = next_residuals;
        if change < MA_TOLERANCE {
            debug!(iteration, "MA estimate converged");
            break;
        }
    }

    Ok((beta[0], Vec::new(), beta[1..].to_vec()))
}

/// 상수항과 MA 계수로 계산한 CSS 잔차.
fn ma_residuals(w: &[f64], constant: f64, theta: &[f64]) -> Vec<f64> {
    let mut residuals = vec![0.0; w.len()];
    for t in 0..w.len() {
        let ma: f64 = theta
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, th)| th * residuals[t - j - 1])
            .sum();
        residuals[t] = w[t] - constant - ma;
    }
    residuals
}

/// Hannan-Rissanen ARMA(p, q) 추정.
fn fit_hannan_rissanen(w: &[f64], p: usize, q: usize) -> Result<(f64, Vec<f64>, Vec<f64>)> {
    let n = w.len();
    let long_order = (p + q).max(10).min(n / 4).max(1);

    // 1단계: 장기 AR로 혁신(innovation)을 근사
    let long = ar_regression(w, long_order)?;
    let mut innovations = vec![0.0; n];
    for t in long_order..n {
        let fitted: f64 = long[0]
            + (1..=long_order)
                .map(|i| long[i] * w[t - i])
                .sum::<f64>();
        innovations[t] = w[t] - fitted;
    }

    // 2단계: 과거 값과 근사 혁신에 대한 회귀
    let start = (long_order + q).max(p);
    let cols = 1 + p + q;
    if n < start + cols + 1 {
        return Err(ModelError::InsufficientData {
            required: start + cols + 1,
            actual: n,
        });
    }

    let rows = n - start;
    let mut design = Vec::with_capacity(rows * cols);
    for t in start..n {
        design.push(1.0);
        design.extend((1..=p).map(|i| w[t - i]));
        design.extend((1..=q).map(|j| innovations[t - j]));
    }
    let beta = least_squares(rows, cols, &design, &w[start..])?;

    Ok((beta[0], beta[1..=p].to_vec(), beta[p + 1..].to_vec()))
}

/// SVD 기반 최소제곱. 특이값이 작은 방향은 버리므로 공선성이 있어도 최소 노름 해를 돌려줍니다.
fn least_squares(rows: usize, cols: usize, design: &[f64], target: &[f64]) -> Result<Vec<f64>> {
    let x = DMatrix::from_row_slice(rows, cols, design);
    let y = DVector::from_column_slice(target);

    let svd = x.svd(true, true);
    let largest = svd.singular_values.max();
    let solution = svd
        .solve(&y, largest * 1e-10)
        .map_err(|e| ModelError::Numerical(format!("least squares failed: {}", e)))?;

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Numerical("least squares produced non-finite coefficients".into()));
    }
    Ok(solution.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn simulate_ar1(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut w = vec![0.0; n];
        for t in 1..n {
            w[t] = phi * w[t - 1] + rng.gen_range(-0.5..0.5);
        }
        w
    }

    fn integrate(w: &[f64], start: f64) -> Vec<f64> {
        let mut level = start;
        let mut out = vec![start];
        for v in w {
            level += v;
            out.push(level);
        }
        out
    }

    #[test]
    fn test_difference() {
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 1), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 2), vec![2.0, 2.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_recovers_ar_coefficient() {
        let prices = integrate(&simulate_ar1(0.6, 3000, 1), 100.0);
        let model = ArimaModel::fit(&prices, ArimaOrder::new(1, 1, 0)).unwrap();

        assert!((model.ar_coefficients()[0] - 0.6).abs() < 0.05, "{:?}", model.ar_coefficients());
        assert!(model.constant().abs() < 0.05);
        assert!(model.ma_coefficients().is_empty());
        assert!(model.aic().is_finite());
        assert!(model.bic() > model.aic());
    }

    #[test]
    fn test_linear_trend_is_extrapolated() {
        let series: Vec<f64> = (0..50).map(|t| 5.0 + 2.0 * t as f64).collect();
        let model = ArimaModel::fit(&series, ArimaOrder::new(5, 1, 0)).unwrap();
        let forecast = model.forecast(&series, 3).unwrap();

        for (i, value) in forecast.iter().enumerate() {
            let expected = 5.0 + 2.0 * (50 + i) as f64;
            assert!((value - expected).abs() < 1e-6, "step {}: {} vs {}", i, value, expected);
        }
    }

    #[test]
    fn test_second_order_differencing() {
        let series: Vec<f64> = (0..40).map(|t| (t * t) as f64).collect();
        let model = ArimaModel::fit(&series, ArimaOrder::new(1, 2, 0)).unwrap();
        let forecast = model.forecast(&series, 2).unwrap();

        assert!((forecast[0] - 1600.0).abs() < 1e-6);
        assert!((forecast[1] - 1681.0).abs() < 1e-6);
    }

    #[test]
    fn test_arma_fit_and_forecast() {
        let w = simulate_ar1(0.4, 800, 2);
        let model = ArimaModel::fit(&w, ArimaOrder::new(1, 0, 1)).unwrap();

        assert_eq!(model.ar_coefficients().len(), 1);
        assert_eq!(model.ma_coefficients().len(), 1);

        let forecast = model.forecast(&w, 5).unwrap();
        assert_eq!(forecast.len(), 5);
        // 정상 과정이므로 예측은 평균(0) 근처로 수렴
        assert!(forecast.iter().all(|v| v.is_finite()));
        assert!(forecast[4].abs() < 0.2, "{:?}", forecast);
    }

    fn simulate_ma1(theta: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut previous = 0.0;
        (0..n)
            .map(|_| {
                let e: f64 = rng.gen_range(-0.5..0.5);
                let value = 1.5 + e + theta * previous;
                previous = e;
                value
            })
            .collect()
    }

    #[test]
    fn test_recovers_ma_coefficient() {
        let w = simulate_ma1(0.5, 3000, 4);
        let model = ArimaModel::fit(&w, ArimaOrder::new(0, 0, 1)).unwrap();

        assert!(model.ar_coefficients().is_empty());
        assert!((model.ma_coefficients()[0] - 0.5).abs() < 0.05, "{:?}", model.ma_coefficients());
        assert!((model.constant() - 1.5).abs() < 0.05);
        // 1/12 = 균등분포(-0.5, 0.5)의 분산
        assert!((model.sigma2() - 1.0 / 12.0).abs() < 0.01, "{}", model.sigma2());

        // MA(1) 예측은 두 번째 시점부터 상수항
        let forecast = model.forecast(&w, 3).unwrap();
        assert!((forecast[1] - model.constant()).abs() < 1e-9);
        assert!((forecast[2] - model.constant()).abs() < 1e-9);
    }

    #[test]
    fn test_ma_beats_white_noise_fit() {
        let prices = integrate(&simulate_ma1(0.6, 600, 5), 100.0);
        let ma = ArimaModel::fit(&prices, ArimaOrder::new(0, 1, 1)).unwrap();
        let mean_only = ArimaModel::fit(&prices, ArimaOrder::new(0, 1, 0)).unwrap();

        assert!(ma.ma_coefficients()[0] > 0.4, "{:?}", ma.ma_coefficients());
        assert!(ma.aic() < mean_only.aic());
    }

    #[test]
    fn test_insufficient_data() {
        let err = ArimaModel::fit(&[1.0; 10], ArimaOrder::new(5, 1, 0)).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InsufficientData {
                required: 16,
                actual: 10
            }
        ));

        let model = ArimaModel::fit(&(0..30).map(f64::from).collect::<Vec<_>>(), ArimaOrder::new(2, 1, 0))
            .unwrap();
        assert!(model.forecast(&[1.0, 2.0], 1).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let series: Vec<f64> = (0..40).map(|t| (t as f64 * 0.2).sin()).collect();
        let model = ArimaModel::fit(&series, ArimaOrder::new(2, 0, 0)).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: ArimaModel = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.order(), model.order());
        let a = model.forecast(&series, 3).unwrap();
        let b = restored.forecast(&series, 3).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
    }
}
