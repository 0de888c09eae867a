use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStorage;

use livechat_core::PersistedSession;

/// Fixed key the persisted session record lives under.
pub const SESSION_RECORD_KEY: &str = "livechat.session";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Holds at most one [`PersistedSession`] outside process memory.
pub trait SessionRecordStore: Send + Sync {
    fn load(&self) -> BoxFuture<'_, StorageResult<Option<PersistedSession>>>;
    fn save(&self, record: PersistedSession) -> BoxFuture<'_, StorageResult<()>>;
    fn clear(&self) -> BoxFuture<'_, StorageResult<()>>;
}
