//! CLI 명령어 구현 모듈.

pub mod collect;
pub mod models;
pub mod predict;
pub mod train;

use anyhow::{bail, Context as _, Result};
use chrono::NaiveDate;
use forecast_core::{AppConfig, DATE_FORMAT};
use forecast_data::{DataCollector, DatasetStore, PriceProvider};
use forecast_models::ForecastService;
use std::sync::Arc;

/// 명령 실행에 필요한 설정과 서비스 묶음.
pub struct Context {
    pub config: AppConfig,
    pub collector: DataCollector,
    pub forecaster: Arc<ForecastService>,
}

impl Context {
    pub fn new(config: AppConfig, provider: Arc<dyn PriceProvider>) -> Self {
        let collector = DataCollector::new(provider, DatasetStore::new(config.data.data_dir.clone()));
        let forecaster = Arc::new(ForecastService::new(config.model.clone()));
        Self {
            config,
            collector,
            forecaster,
        }
    }

    /// 명령줄 심볼을 정규화합니다. 없으면 설정의 심볼.
    pub fn symbol(&self, symbol: Option<&str>) -> String {
        match symbol.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_uppercase(),
            None => self.config.data.symbol.clone(),
        }
    }

    /// 수집 구간. 명령줄 값이 설정보다 우선합니다.
    pub fn range(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
        let start = from.unwrap_or(self.config.data.start_date);
        let end = to.unwrap_or_else(|| self.config.data.effective_end_date());
        if start >= end {
            bail!("Start date {} must be before end date {}", start, end);
        }
        Ok((start, end))
    }
}

/// `YYYY-MM-DD` 날짜 파싱.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("Invalid date format: {}. Expected YYYY-MM-DD", s))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use forecast_core::ArimaOrder;
    use forecast_data::StaticPriceProvider;

    /// 2024-01-01부터 100일치 합성 종가를 쓰는 작은 설정의 컨텍스트.
    pub fn context(root: &std::path::Path) -> Context {
        let mut config = AppConfig::default();
        config.data.data_dir = root.join("data");
        config.data.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        config.data.end_date = NaiveDate::from_ymd_opt(2025, 1, 1);
        config.model.model_dir = root.join("models");
        config.model.sequence_length = 5;
        config.model.hidden_size = 4;
        config.model.num_layers = 1;
        config.model.epochs = 3;
        config.model.batch_size = 16;
        config.model.arima = ArimaOrder::new(1, 1, 0);
        config.model.seed = Some(11);

        let closes: Vec<f64> = (0..100)
            .map(|i| 1_500.0 + (i as f64 * 0.2).sin() * 40.0 + i as f64)
            .collect();
        let provider = StaticPriceProvider::from_closes(config.data.start_date, &closes);
        Context::new(config, Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(parse_date("03/01/2024").is_err());
    }

    #[test]
    fn test_range_overrides_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(dir.path());

        let (start, end) = ctx.range(None, None).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(ctx.range(Some(from), None).unwrap().0, from);
        assert!(ctx.range(Some(end), Some(from)).is_err());
    }

    #[test]
    fn test_symbol_normalisation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(dir.path());
        assert_eq!(ctx.symbol(None), "BTC-USD");
        assert_eq!(ctx.symbol(Some("eth-usd")), "ETH-USD");
    }
}
