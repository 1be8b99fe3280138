pub mod logger;
pub mod types;

pub use logger::{AuditError, AuditLogger, SqliteAuditLogger};
pub use types::{AuditAction, AuditEvent, AuditFilter, AuditLevel};
