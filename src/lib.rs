//! Client core for the MediBook appointment platform.
//!
//! The patient and doctor apps share this crate for everything that talks
//! to the backend: credential storage, the authenticated request path
//! with transparent refresh-and-retry, and the process-wide forced-logout
//! broadcast that returns the user to the login screen when a session is
//! unrecoverable.
//!
//! ```no_run
//! use std::sync::Arc;
//! use medibook_client::{Config, LoginCredentials, LogoutBroadcaster, Session};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let broadcaster = Arc::new(LogoutBroadcaster::new());
//! let session = Session::from_config(&config, Arc::clone(&broadcaster))?;
//!
//! // Navigation-owning code reacts to forced logouts without a direct
//! // call-stack relationship to the request path.
//! let _listener = broadcaster.subscribe(|event| {
//!     eprintln!("{}", event.reason);
//! });
//!
//! session.restore();
//! session.login(LoginCredentials::new("a@b.com", "secret")).await?;
//! let me = session.current_user().await?;
//! println!("signed in as {:?}", me.name);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiRequest, ClientError, HttpTransport, ReqwestTransport, SessionGuard};
pub use auth::{
    AuthState, CredentialStore, LogoutBroadcaster, LogoutEvent, Session, Subscription,
};
pub use config::Config;
pub use models::{AppointmentSummary, DoctorSummary, LoginCredentials, UserProfile};
