//! 가격 데이터 수집 및 저장.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 외부 시세 제공자 추상화와 Yahoo Finance 구현
//! - 심볼별 CSV 데이터셋 저장소
//! - PostgreSQL 기반 가격/액션 로그 저장소
//! - 다운로드부터 저장까지 묶은 데이터 수집기

pub mod collector;
pub mod dataset;
pub mod error;
pub mod provider;
pub mod storage;

pub use collector::{CollectReport, DataCollector};
pub use dataset::DatasetStore;
pub use error::{DataError, Result};
pub use provider::{PriceProvider, YahooPriceProvider};
pub use storage::{ActionLogRepository, Database, PriceRecord, PriceRepository};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::StaticPriceProvider;
