//! PostgreSQL 스토리지.

mod action_log;
mod database;
mod prices;

pub use action_log::ActionLogRepository;
pub use database::Database;
pub use prices::{PriceRecord, PriceRepository};
