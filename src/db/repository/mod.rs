//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`; the store adapters in
//! `db::store` own the connection and map these onto the persistence traits.

mod assessment;
mod audit;

use chrono::{DateTime, SecondsFormat, Utc};

use super::DatabaseError;

pub use assessment::*;
pub use audit::*;

/// Canonical timestamp text. Lossless so stored entries round-trip exactly.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub(crate) fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidTimestamp {
            field: field.into(),
            value: value.into(),
        })
}
