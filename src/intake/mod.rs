//! Change Intake helpers: payload parsing, snapshot merge, and the
//! immediate-processing classifier.

pub mod critical;
pub mod merge;
pub mod payload;

pub use critical::is_critical_change;
pub use merge::merge_events;

use thiserror::Error;
use uuid::Uuid;

use crate::models::ChangeType;

/// Structural problem with a change payload. Messages name fields, never
/// their clinical values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("{change_type} payload is not a JSON object")]
    NotAnObject { change_type: ChangeType },

    #[error("{change_type} payload is missing required field `{field}`")]
    MissingField {
        change_type: ChangeType,
        field: &'static str,
    },

    #[error("{change_type} payload field `{field}` is invalid: {reason}")]
    InvalidField {
        change_type: ChangeType,
        field: &'static str,
        reason: &'static str,
    },

    #[error("{change_type} payload names unknown action `{action}`")]
    UnknownAction {
        change_type: ChangeType,
        action: String,
    },
}

#[derive(Error, Debug, Clone)]
#[error("change event {event_id} could not be merged: {source}")]
pub struct MergeFailure {
    pub event_id: Uuid,
    #[source]
    pub source: MergeError,
}
