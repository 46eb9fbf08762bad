//! Appointment and doctor wire types.
//!
//! Deliberately thin: the clients render whatever the backend sends, so
//! only the fields every surface needs are typed here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AppointmentSummary {
    pub id: i64,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// "pending", "confirmed", "completed", "cancelled".
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct DoctorSummary {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// Unwrap a list payload that may arrive as a bare array, under `data`,
/// or under a named field.
pub(crate) fn extract_list<T: serde::de::DeserializeOwned>(
    payload: &Value,
    field: &str,
) -> Vec<T> {
    let candidate = if payload.is_array() {
        payload
    } else if let Some(inner) = payload.get("data") {
        // `data` itself may be the array or may wrap the named field.
        if inner.is_array() {
            inner
        } else {
            inner.get(field).unwrap_or(inner)
        }
    } else if let Some(named) = payload.get(field) {
        named
    } else {
        return Vec::new();
    };

    serde_json::from_value(candidate.clone()).unwrap_or_default()
}
