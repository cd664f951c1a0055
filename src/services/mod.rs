// Service exports
pub mod gemini;
pub mod memory;
pub mod notifier;
pub mod oracle;
pub mod postgres;
pub mod store;
pub mod telegram;

pub use gemini::GeminiClient;
pub use memory::MemoryStore;
pub use notifier::{NotificationError, Notifier};
pub use oracle::{FaceComparer, FaceDescriber, OracleError};
pub use postgres::{JobListener, PostgresStore, JOB_CHANNEL};
pub use store::{RecordStore, StoreError};
pub use telegram::TelegramNotifier;
