//! 액션 로그 저널.
//!
//! 사용자 동작(예측 요청, 재학습 등)을 기록합니다. 데이터베이스가 연결되어 있으면
//! `logs` 테이블에 저장하고, 항상 최근 항목을 메모리에도 보관합니다.

use forecast_core::ActionLogEntry;
use forecast_data::ActionLogRepository;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 메모리에 보관하는 최대 항목 수.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1000;

/// 메모리 + 선택적 데이터베이스 액션 로그.
pub struct ActionJournal {
    repository: Option<ActionLogRepository>,
    recent: RwLock<VecDeque<ActionLogEntry>>,
    capacity: usize,
    next_id: AtomicI64,
}

impl ActionJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            repository: None,
            recent: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn with_repository(mut self, repository: ActionLogRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.repository.is_some()
    }

    /// 액션을 기록합니다.
    ///
    /// 데이터베이스 저장이 실패해도 메모리 기록은 남기고 경고만 남깁니다.
    pub async fn record(&self, action: &str, details: Option<&str>) -> ActionLogEntry {
        let entry = match &self.repository {
            Some(repo) => match repo.record(action, details).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(action, error = %e, "Failed to persist action log");
                    self.local_entry(action, details)
                }
            },
            None => self.local_entry(action, details),
        };

        info!(action, details = details.unwrap_or(""), "Action logged");

        let mut recent = self.recent.write().await;
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(entry.clone());
        entry
    }

    /// 메모리 전용 항목. ID는 1부터 증가하는 순번입니다.
    fn local_entry(&self, action: &str, details: Option<&str>) -> ActionLogEntry {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ActionLogEntry::new(action, details.map(str::to_string)).with_id(id)
    }

    /// 최근 항목을 최신순으로 반환합니다.
    ///
    /// 데이터베이스 조회가 실패하면 메모리 기록으로 대신합니다.
    pub async fn recent(&self, limit: usize) -> Vec<ActionLogEntry> {
        if let Some(repo) = &self.repository {
            match repo.list_recent(limit as i64).await {
                Ok(entries) => return entries,
                Err(e) => warn!(error = %e, "Failed to read action log, using in-memory journal"),
            }
        }
        self.recent
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for ActionJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}
