//! # Forecast Core
//!
//! 가격 예측 서비스의 핵심 도메인 타입을 제공합니다.
//!
//! 이 크레이트는 다른 모든 크레이트가 공유하는 기본 요소를 담고 있습니다:
//! - 일봉 OHLCV 가격 데이터
//! - 예측 모델 종류와 예측 결과 타입
//! - 액션 로그 항목
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
