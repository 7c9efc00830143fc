//! Import / export
//!
//! - `backup`: the portable backup document (export and full restore)
//! - `switchhosts`: migration from SwitchHosts exports

pub mod backup;
pub mod switchhosts;

// Re-exports
pub use backup::{export_all, import_all, parse_backup, Backup, BackupContents, BackupProfile};
pub use switchhosts::{import_switchhosts, parse_switchhosts};
