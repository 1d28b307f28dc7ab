//! Typed parsing of opaque change payloads.
//!
//! Structural problems (not an object, missing required key, unknown action)
//! are errors and fail the whole cycle. Individual unreadable numeric
//! readings are skipped with a warning, never fatal.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{ChangeType, LabResult};

use super::MergeError;

static RE_BP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\s*(?:mmhg)?\s*$").unwrap()
});

/// Physiologic plausibility ranges; readings outside are clamped.
const SYSTOLIC_RANGE: (f64, f64) = (0.0, 350.0);
const DIASTOLIC_RANGE: (f64, f64) = (0.0, 250.0);
const HEART_RATE_RANGE: (f64, f64) = (0.0, 300.0);
const TEMPERATURE_RANGE: (f64, f64) = (20.0, 46.0);
const SPO2_RANGE: (f64, f64) = (0.0, 100.0);
const RESP_RATE_RANGE: (f64, f64) = (0.0, 80.0);
const MAX_AGE: u64 = 130;

/// A parsed change, ready to merge into a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ClinicalChange {
    Vitals(VitalsUpdate),
    Medications(Vec<MedicationChange>),
    Labs(Vec<LabResult>),
    History(Vec<HistoryChange>),
    Demographics { age: u32 },
}

/// Readings present in one vitals payload. Blood pressure sides are kept
/// apart so a lone systolic update can combine with a stored diastolic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VitalsUpdate {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub respiratory_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    Upsert,
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MedicationChange {
    pub action: ListAction,
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryChange {
    pub action: ListAction,
    pub condition: String,
}

pub fn parse_change(change_type: ChangeType, payload: &Value) -> Result<ClinicalChange, MergeError> {
    let obj = payload
        .as_object()
        .ok_or(MergeError::NotAnObject { change_type })?;
    match change_type {
        ChangeType::Vitals => Ok(ClinicalChange::Vitals(parse_vitals(obj)?)),
        ChangeType::Medication => {
            let changes = entries(obj, "medications", change_type)?
                .into_iter()
                .map(parse_medication)
                .collect::<Result<_, _>>()?;
            Ok(ClinicalChange::Medications(changes))
        }
        ChangeType::Lab => {
            let labs = entries(obj, "results", change_type)?
                .into_iter()
                .map(parse_lab)
                .collect::<Result<_, _>>()?;
            Ok(ClinicalChange::Labs(labs))
        }
        ChangeType::History => Ok(ClinicalChange::History(parse_history(obj)?)),
        ChangeType::Demographics => parse_demographics(obj),
    }
}

// ═══════════════════════════════════════════════════════════
// Vitals
// ═══════════════════════════════════════════════════════════

fn parse_vitals(obj: &Map<String, Value>) -> Result<VitalsUpdate, MergeError> {
    let mut update = VitalsUpdate::default();

    if let Some(bp) = obj.get("blood_pressure") {
        match bp {
            Value::String(s) => match RE_BP.captures(&s.to_lowercase()) {
                Some(caps) => {
                    update.systolic = caps.get(1).and_then(|m| m.as_str().parse().ok());
                    update.diastolic = caps.get(2).and_then(|m| m.as_str().parse().ok());
                }
                None => skipped("blood_pressure"),
            },
            Value::Object(parts) => {
                update.systolic = reading(parts, "systolic");
                update.diastolic = reading(parts, "diastolic");
            }
            Value::Null => {}
            _ => skipped("blood_pressure"),
        }
    }
    if let Some(v) = reading(obj, "systolic_bp") {
        update.systolic = Some(v);
    }
    if let Some(v) = reading(obj, "diastolic_bp") {
        update.diastolic = Some(v);
    }

    update.systolic = update.systolic.and_then(|v| plausible(v, SYSTOLIC_RANGE));
    update.diastolic = update.diastolic.and_then(|v| plausible(v, DIASTOLIC_RANGE));
    update.heart_rate = reading(obj, "heart_rate").and_then(|v| plausible(v, HEART_RATE_RANGE));
    update.temperature = reading(obj, "temperature").and_then(|v| plausible(v, TEMPERATURE_RANGE));
    update.oxygen_saturation =
        reading(obj, "oxygen_saturation").and_then(|v| plausible(v, SPO2_RANGE));
    update.respiratory_rate =
        reading(obj, "respiratory_rate").and_then(|v| plausible(v, RESP_RATE_RANGE));

    Ok(update)
}

/// Read a numeric field given as a JSON number or a numeric string.
fn reading(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = obj.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        skipped(key);
    }
    parsed
}

/// Drop non-finite or negative readings, clamp the rest.
fn plausible(value: f64, (lo, hi): (f64, f64)) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        tracing::warn!("Dropping out-of-domain vital reading");
        return None;
    }
    Some(value.clamp(lo, hi))
}

fn skipped(field: &str) {
    tracing::warn!(field, "Skipping unreadable vital reading");
}

// ═══════════════════════════════════════════════════════════
// Medications, labs, history, demographics
// ═══════════════════════════════════════════════════════════

/// Either the array under `list_key`, or the object itself as a single entry.
fn entries<'a>(
    obj: &'a Map<String, Value>,
    list_key: &'static str,
    change_type: ChangeType,
) -> Result<Vec<EntryRef<'a>>, MergeError> {
    match obj.get(list_key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .map(|o| EntryRef { obj: o, change_type })
                    .ok_or(MergeError::InvalidField {
                        change_type,
                        field: list_key,
                        reason: "entries must be objects",
                    })
            })
            .collect(),
        Some(_) => Err(MergeError::InvalidField {
            change_type,
            field: list_key,
            reason: "expected an array",
        }),
        None => Ok(vec![EntryRef { obj, change_type }]),
    }
}

struct EntryRef<'a> {
    obj: &'a Map<String, Value>,
    change_type: ChangeType,
}

fn required_string(
    obj: &Map<String, Value>,
    field: &'static str,
    change_type: ChangeType,
) -> Result<String, MergeError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(MergeError::MissingField { change_type, field })
        }
        Some(_) => Err(MergeError::InvalidField {
            change_type,
            field,
            reason: "expected a string",
        }),
    }
}

fn optional_text(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn action(obj: &Map<String, Value>, change_type: ChangeType) -> Result<ListAction, MergeError> {
    match obj.get("action") {
        None | Some(Value::Null) => Ok(ListAction::Upsert),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "add" | "update" | "start" => Ok(ListAction::Upsert),
            "remove" | "stop" | "discontinue" => Ok(ListAction::Remove),
            other => Err(MergeError::UnknownAction {
                change_type,
                action: other.to_string(),
            }),
        },
        Some(_) => Err(MergeError::InvalidField {
            change_type,
            field: "action",
            reason: "expected a string",
        }),
    }
}

fn parse_medication(entry: EntryRef<'_>) -> Result<MedicationChange, MergeError> {
    Ok(MedicationChange {
        action: action(entry.obj, entry.change_type)?,
        name: required_string(entry.obj, "name", entry.change_type)?,
        dose: optional_text(entry.obj, "dose"),
        frequency: optional_text(entry.obj, "frequency"),
    })
}

fn parse_lab(entry: EntryRef<'_>) -> Result<LabResult, MergeError> {
    let test_name = required_string(entry.obj, "test_name", entry.change_type)?;
    let value = match entry.obj.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .filter(|v| v.is_finite());
    Ok(LabResult {
        test_name,
        value,
        unit: optional_text(entry.obj, "unit"),
        abnormal: abnormal_flag(entry.obj),
    })
}

/// `abnormal` as a boolean, or a flag string such as "H", "critical", "panic".
fn abnormal_flag(obj: &Map<String, Value>) -> bool {
    let flag = obj.get("abnormal").or_else(|| obj.get("flag"));
    match flag {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "h" | "l" | "high" | "low" | "abnormal" | "critical" | "panic"
                | "critical_high" | "critical_low"
        ),
        _ => false,
    }
}

fn parse_history(obj: &Map<String, Value>) -> Result<Vec<HistoryChange>, MergeError> {
    let change_type = ChangeType::History;
    let action = action(obj, change_type)?;
    let mut names = Vec::new();
    if obj.contains_key("condition") {
        names.push(required_string(obj, "condition", change_type)?);
    }
    match obj.get("conditions") {
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_str().map(str::trim) {
                    Some(s) if !s.is_empty() => names.push(s.to_string()),
                    _ => {
                        return Err(MergeError::InvalidField {
                            change_type,
                            field: "conditions",
                            reason: "entries must be non-empty strings",
                        })
                    }
                }
            }
        }
        Some(_) => {
            return Err(MergeError::InvalidField {
                change_type,
                field: "conditions",
                reason: "expected an array",
            })
        }
        None => {}
    }
    if names.is_empty() {
        return Err(MergeError::MissingField {
            change_type,
            field: "condition",
        });
    }
    Ok(names
        .into_iter()
        .map(|condition| HistoryChange {
            action,
            condition: condition.to_lowercase(),
        })
        .collect())
}

fn parse_demographics(obj: &Map<String, Value>) -> Result<ClinicalChange, MergeError> {
    let change_type = ChangeType::Demographics;
    let age = match obj.get("age") {
        None | Some(Value::Null) => {
            return Err(MergeError::MissingField {
                change_type,
                field: "age",
            })
        }
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match age {
        Some(age) if age <= MAX_AGE => Ok(ClinicalChange::Demographics { age: age as u32 }),
        _ => Err(MergeError::InvalidField {
            change_type,
            field: "age",
            reason: "expected a whole number between 0 and 130",
        }),
    }
}
