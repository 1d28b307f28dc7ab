use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::AuditEntry;

use super::{format_ts, parse_ts};

/// `prev_hash` of the first entry in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Result of walking the audit chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Intact { entries: usize },
    /// First entry whose stored hash or back-link does not match.
    Broken { entry_id: String, position: usize },
}

/// SHA-256 over the previous hash and the entry's canonical fields.
pub fn entry_hash(prev_hash: &str, entry: &AuditEntry) -> String {
    let id = entry.id.to_string();
    let timestamp = format_ts(&entry.timestamp);
    let parts: [&str; 9] = [
        prev_hash,
        &id,
        &timestamp,
        entry.action.as_str(),
        &entry.patient_id,
        &entry.physician_id,
        &entry.tenant_id,
        &entry.previous_value,
        &entry.new_value,
    ];
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// Append an entry, linking it to the current chain head.
pub fn append_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let prev_hash: String = tx
        .query_row(
            "SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or_else(|| GENESIS_HASH.to_string());
    let hash = entry_hash(&prev_hash, entry);
    tx.execute(
        "INSERT INTO audit_log (id, timestamp, action, patient_id, physician_id, tenant_id, previous_value, new_value, prev_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.to_string(),
            format_ts(&entry.timestamp),
            entry.action.as_str(),
            entry.patient_id,
            entry.physician_id,
            entry.tenant_id,
            entry.previous_value,
            entry.new_value,
            prev_hash,
            hash,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Entries for one patient within a tenant, oldest first.
pub fn get_audit_entries_for_patient(
    conn: &Connection,
    tenant_id: &str,
    patient_id: &str,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, action, patient_id, physician_id, tenant_id, previous_value, new_value
         FROM audit_log
         WHERE tenant_id = ?1 AND patient_id = ?2
         ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![tenant_id, patient_id], raw_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RawEntry::into_entry).collect()
}

/// Recompute every link of the chain from genesis.
pub fn verify_chain(conn: &Connection) -> Result<ChainStatus, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, action, patient_id, physician_id, tenant_id, previous_value, new_value, prev_hash, hash
         FROM audit_log ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                raw_entry(row)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut expected_prev = GENESIS_HASH.to_string();
    for (position, (raw, prev_hash, hash)) in rows.into_iter().enumerate() {
        let entry_id = raw.id.clone();
        let intact = match raw.into_entry() {
            Ok(entry) => prev_hash == expected_prev && entry_hash(&prev_hash, &entry) == hash,
            Err(_) => false,
        };
        if !intact {
            return Ok(ChainStatus::Broken { entry_id, position });
        }
        expected_prev = hash;
    }
    Ok(ChainStatus::Intact {
        entries: conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| {
            row.get::<_, i64>(0)
        })? as usize,
    })
}

struct RawEntry {
    id: String,
    timestamp: String,
    action: String,
    patient_id: String,
    physician_id: String,
    tenant_id: String,
    previous_value: String,
    new_value: String,
}

fn raw_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        action: row.get(2)?,
        patient_id: row.get(3)?,
        physician_id: row.get(4)?,
        tenant_id: row.get(5)?,
        previous_value: row.get(6)?,
        new_value: row.get(7)?,
    })
}

impl RawEntry {
    fn into_entry(self) -> Result<AuditEntry, DatabaseError> {
        Ok(AuditEntry {
            id: Uuid::parse_str(&self.id).map_err(|_| DatabaseError::InvalidEnum {
                field: "audit_log.id".into(),
                value: self.id.clone(),
            })?,
            timestamp: parse_ts("timestamp", &self.timestamp)?,
            action: self.action.parse()?,
            patient_id: self.patient_id,
            physician_id: self.physician_id,
            tenant_id: self.tenant_id,
            previous_value: self.previous_value,
            new_value: self.new_value,
        })
    }
}
