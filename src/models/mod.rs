//! Wire types shared by the client surfaces.

pub mod appointment;
pub mod user;

pub(crate) use appointment::extract_list;
pub use appointment::{AppointmentSummary, DoctorSummary};
pub use user::{extract_profile, extract_token, LoginCredentials, UserProfile};
