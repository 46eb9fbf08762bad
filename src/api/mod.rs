//! REST client layer for the MediBook backend.
//!
//! Layered bottom-up: `transport` issues raw HTTP, `executor` builds and
//! classifies single attempts, `guard` wraps the executor with the
//! refresh-and-retry session machinery every authenticated call goes
//! through.

pub mod error;
pub mod executor;
pub mod guard;
pub mod transport;

pub use error::ClientError;
pub use executor::{ApiRequest, CallOutcome, RequestExecutor};
pub use guard::SessionGuard;
pub use transport::{HttpTransport, ReqwestTransport};
