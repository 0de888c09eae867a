use std::sync::Arc;

use arc_swap::ArcSwapOption;
use livechat_core::PersistedSession;

use super::{BoxFuture, SessionRecordStore, StorageResult};

/// Process-local store; the record is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: ArcSwapOption<PersistedSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: PersistedSession) -> Self {
        Self {
            record: ArcSwapOption::from_pointee(record),
        }
    }

    pub fn current(&self) -> Option<PersistedSession> {
        self.record.load_full().map(|record| (*record).clone())
    }
}

impl SessionRecordStore for MemoryStore {
    fn load(&self) -> BoxFuture<'_, StorageResult<Option<PersistedSession>>> {
        Box::pin(async move { Ok(self.current()) })
    }

    fn save(&self, record: PersistedSession) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.record.store(Some(Arc::new(record)));
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.record.store(None);
            Ok(())
        })
    }
}
