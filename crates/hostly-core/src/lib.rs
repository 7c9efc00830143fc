pub mod compose;
pub mod config;
pub mod error;
pub mod hosts;
pub mod manager;
pub mod profile;
pub mod profile_metadata;
pub mod remote;
pub mod rpc;
pub mod service;
pub mod transfer;

pub use compose::{compose, content_digest};
pub use config::{HostsSettings, RemoteSettings, Settings, StoreSettings};
pub use error::{HostlyError, Result};
pub use hosts::{default_hosts_path, SystemHostsWriter};
pub use manager::{ChangeEvent, HostsManager};
pub use profile::{CompositionInput, FetchRecord, NewProfile, Profile, ProfileStore};
pub use profile_metadata::{AppConfig, ProfileMetadata, ProfileSource};
pub use remote::{
    is_due, validate_source_url, Clock, HttpFetcher, RemoteFetcher, SystemClock, UpdateScheduler,
};
pub use rpc::{dispatch, RpcError};
pub use service::Hostly;

// Import / export
pub use transfer::{
    export_all, import_all, import_switchhosts, parse_backup, parse_switchhosts, Backup,
    BackupContents, BackupProfile,
};
