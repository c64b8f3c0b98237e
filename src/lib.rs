#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports for convenient access
pub use client::{ApiConfig, IdentityClient, IdentityProvider};
pub use config::SessionConfig;
pub use error::Error;
pub use manager::{DEFAULT_REFRESH_INTERVAL, SessionManager};
pub use state::{SessionPhase, SessionSnapshot};
pub use storage::{AnyStorage, FileStorage, MemoryStorage, SessionStorage, StorageKey};
pub use types::{Credentials, CurrentPackage, Role, TokenPair, UserId, UserProfile};
