//! 서비스 전반에서 사용되는 공통 타입.

mod action;
mod forecast;
mod model;
mod price;

pub use action::*;
pub use forecast::*;
pub use model::*;
pub use price::*;
