pub mod logger;
pub mod record;

pub use logger::{LogContext, LogEntry, LogLevel, TransactionLogger};
pub use record::{AuditRecord, AuditStatus};
