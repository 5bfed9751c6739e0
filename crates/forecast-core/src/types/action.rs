//! 사용자/시스템 액션 로그.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 액션 로그 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ActionLogEntry {
    /// 저장소에서 부여한 ID (메모리 저널에서는 순번)
    pub id: Option<i64>,
    /// 기록 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 액션 이름
    pub action: String,
    /// 부가 설명
    pub details: Option<String>,
}

impl ActionLogEntry {
    /// 현재 시각으로 새 항목을 생성합니다.
    pub fn new(action: impl Into<String>, details: Option<String>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            action: action.into(),
            details,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}
