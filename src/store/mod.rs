//! Persistence layer — libSQL-backed storage for profiles and local accounts.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{AccountStore, ProfilePatch, ProfileStore, StoredAccount, UserProfile};
