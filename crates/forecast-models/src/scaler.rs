//! Min-Max 정규화.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// 값을 `[0, 1]` 구간으로 선형 변환하는 스케일러.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: f64,
    data_max: f64,
}

impl MinMaxScaler {
    /// 데이터의 최소/최대값을 학습합니다.
    pub fn fit(data: &[f64]) -> Result<Self> {
        if data.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidInput(
                "cannot fit scaler on non-finite values".into(),
            ));
        }

        let (data_min, data_max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        Ok(Self { data_min, data_max })
    }

    pub fn data_min(&self) -> f64 {
        self.data_min
    }

    pub fn data_max(&self) -> f64 {
        self.data_max
    }

    fn range(&self) -> f64 {
        let range = self.data_max - self.data_min;
        // 상수 시계열은 0으로 나누지 않도록 폭 1로 취급
        if range > 0.0 {
            range
        } else {
            1.0
        }
    }

    pub fn transform_one(&self, value: f64) -> f64 {
        (value - self.data_min) / self.range()
    }

    pub fn inverse_one(&self, value: f64) -> f64 {
        value * self.range() + self.data_min
    }

    pub fn transform(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&v| self.transform_one(v)).collect()
    }

    pub fn inverse_transform(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&v| self.inverse_one(v)).collect()
    }

    /// 학습과 변환을 한 번에 수행합니다.
    pub fn fit_transform(data: &[f64]) -> Result<(Self, Vec<f64>)> {
        let scaler = Self::fit(data)?;
        let scaled = scaler.transform(data);
        Ok((scaler, scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_transform_range() {
        let (scaler, scaled) = MinMaxScaler::fit_transform(&[10.0, 20.0, 15.0]).unwrap();
        assert_eq!(scaled, vec![0.0, 1.0, 0.5]);
        assert_eq!(scaler.inverse_one(0.5), 15.0);
    }

    #[test]
    fn test_constant_series() {
        let (scaler, scaled) = MinMaxScaler::fit_transform(&[7.0, 7.0]).unwrap();
        assert_eq!(scaled, vec![0.0, 0.0]);
        assert_eq!(scaler.inverse_one(0.0), 7.0);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(MinMaxScaler::fit(&[]).is_err());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_err());
    }

    proptest! {
        #[test]
        fn prop_scaled_values_within_unit_interval(
            data in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)
        ) {
            let (scaler, scaled) = MinMaxScaler::fit_transform(&data).unwrap();
            for (&orig, &s) in data.iter().zip(&scaled) {
                prop_assert!((-1e-12..=1.0 + 1e-12).contains(&s));
                prop_assert!((scaler.inverse_one(s) - orig).abs() <= 1e-6 * (1.0 + orig.abs()));
            }
        }
    }
}
