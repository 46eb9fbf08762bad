//! Authentication: credential storage, session facade, forced-logout
//! broadcast.
//!
//! This module provides:
//! - `CredentialStore`: the single owner of the bearer credential
//! - `Session`: the facade application code calls
//! - `LogoutBroadcaster`: process-wide forced-logout delivery

pub mod credentials;
pub mod events;
pub mod session;

pub use credentials::{CredentialBackend, CredentialError, CredentialStore, MemoryBackend};
pub use events::{LogoutBroadcaster, LogoutEvent, Subscription};
pub use session::{AuthState, NavigationHandler, Session};
