//! Persistent record store for incidents and their trail, using redb.
//!
//! # Table design
//!
//! Incidents live under their raw UUID bytes. Actions use a 24-byte composite
//! key:
//! ```text
//! [ incident uuid: 16 bytes | seq: u64 big-endian (8 bytes) ]
//! ```
//! so a prefix range scan yields one incident's actions in execution order.
//! Evidence and tickets use a 40-byte composite key:
//! ```text
//! [ incident uuid: 16 bytes | timestamp_ms: u64 big-endian | row uuid: 16 bytes ]
//! ```
//! Values are JSON-encoded records. Every public operation opens its own
//! write or read transaction; nothing spans a workflow run.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, TriageError};
use crate::types::{ActionRecord, EvidenceRecord, Incident, IncidentStatus, TicketRecord};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const INCIDENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("incidents");
const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
const EVIDENCE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("evidence");
const TICKETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tickets");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn action_key(incident_id: Uuid, seq: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(incident_id.as_bytes());
    key[16..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn trail_key(incident_id: Uuid, ts_ms: u64, id: Uuid) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..16].copy_from_slice(incident_id.as_bytes());
    key[16..24].copy_from_slice(&ts_ms.to_be_bytes());
    key[24..].copy_from_slice(id.as_bytes());
    key
}

/// Inclusive bounds covering every key with the given incident prefix.
fn prefix_bounds<const N: usize>(incident_id: Uuid) -> ([u8; N], [u8; N]) {
    let mut low = [0u8; N];
    let mut high = [0xffu8; N];
    low[..16].copy_from_slice(incident_id.as_bytes());
    high[..16].copy_from_slice(incident_id.as_bytes());
    (low, high)
}

fn store_err(e: impl std::fmt::Display) -> TriageError {
    TriageError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// IncidentStore
// ---------------------------------------------------------------------------

/// Record store for incidents, actions, evidence, and tickets.
pub struct IncidentStore {
    db: Database,
}

impl IncidentStore {
    /// Open or create the database at `path`, ensuring all tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(INCIDENTS).map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.open_table(EVIDENCE).map_err(store_err)?;
        wt.open_table(TICKETS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    // -- incidents ----------------------------------------------------------

    pub fn create_incident(&self, incident: &Incident) -> Result<()> {
        let value = serde_json::to_vec(incident)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(INCIDENTS).map_err(store_err)?;
            table
                .insert(incident.id.as_bytes().as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn get_incident(&self, id: Uuid) -> Result<Incident> {
        self.try_get_incident(id)?
            .ok_or(TriageError::IncidentNotFound(id))
    }

    fn try_get_incident(&self, id: Uuid) -> Result<Option<Incident>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(INCIDENTS).map_err(store_err)?;
        match table.get(id.as_bytes().as_slice()).map_err(store_err)? {
            Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
            None => Ok(None),
        }
    }

    /// Overwrite the incident's status. Unknown ids are a no-op, matching the
    /// original service's tolerant status writer.
    pub fn set_status(&self, id: Uuid, status: IncidentStatus) -> Result<()> {
        self.update_incident(id, |inc| inc.status = status)
    }

    /// Persist the summary and mark the incident resolved in one write.
    pub fn resolve_with_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        self.update_incident(id, |inc| {
            inc.summary = Some(summary.to_string());
            inc.status = IncidentStatus::Resolved;
        })
    }

    fn update_incident(&self, id: Uuid, mutate: impl FnOnce(&mut Incident)) -> Result<()> {
        let Some(mut incident) = self.try_get_incident(id)? else {
            return Ok(());
        };
        mutate(&mut incident);
        let value = serde_json::to_vec(&incident)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(INCIDENTS).map_err(store_err)?;
            table
                .insert(id.as_bytes().as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    // -- actions ------------------------------------------------------------

    /// Append one action to the incident's trail. The sequence number is
    /// assigned inside the write transaction, so appends from the sequential
    /// workflow can never interleave out of order.
    pub fn append_action(&self, incident_id: Uuid, kind: &str, payload: Value) -> Result<ActionRecord> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let record;
        {
            let mut table = wt.open_table(ACTIONS).map_err(store_err)?;
            let (low, high) = prefix_bounds::<24>(incident_id);
            let last_seq = table
                .range(low.as_slice()..=high.as_slice())
                .map_err(store_err)?
                .last()
                .transpose()
                .map_err(store_err)?
                .map(|(k, _)| {
                    let mut seq = [0u8; 8];
                    seq.copy_from_slice(&k.value()[16..24]);
                    u64::from_be_bytes(seq)
                })
                .unwrap_or(0);

            record = ActionRecord {
                id: Uuid::new_v4(),
                incident_id,
                seq: last_seq + 1,
                kind: kind.to_string(),
                payload,
                at: Utc::now(),
            };
            let key = action_key(incident_id, record.seq);
            let value = serde_json::to_vec(&record)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    /// First action of the given kind in trail order, if any.
    pub fn first_action_of_kind(&self, incident_id: Uuid, kind: &str) -> Result<Option<ActionRecord>> {
        for action in self.scan_actions(incident_id)? {
            if action.kind == kind {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    /// One page of the incident's trail in execution order.
    pub fn list_actions(&self, incident_id: Uuid, limit: usize, offset: usize) -> Result<Vec<ActionRecord>> {
        Ok(self
            .scan_actions(incident_id)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    pub fn count_actions(&self, incident_id: Uuid) -> Result<usize> {
        Ok(self.scan_actions(incident_id)?.len())
    }

    fn scan_actions(&self, incident_id: Uuid) -> Result<Vec<ActionRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;
        let (low, high) = prefix_bounds::<24>(incident_id);
        let mut result = Vec::new();
        for entry in table
            .range(low.as_slice()..=high.as_slice())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    // -- evidence -----------------------------------------------------------

    pub fn add_evidence(
        &self,
        incident_id: Uuid,
        kind: &str,
        path: &str,
        hash: Option<String>,
    ) -> Result<EvidenceRecord> {
        let record = EvidenceRecord {
            id: Uuid::new_v4(),
            incident_id,
            kind: kind.to_string(),
            path: path.to_string(),
            hash,
            at: Utc::now(),
        };
        let key = trail_key(
            incident_id,
            record.at.timestamp_millis().max(0) as u64,
            record.id,
        );
        let value = serde_json::to_vec(&record)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(EVIDENCE).map_err(store_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    pub fn list_evidence(&self, incident_id: Uuid) -> Result<Vec<EvidenceRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(EVIDENCE).map_err(store_err)?;
        let (low, high) = prefix_bounds::<40>(incident_id);
        let mut result = Vec::new();
        for entry in table
            .range(low.as_slice()..=high.as_slice())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    // -- tickets ------------------------------------------------------------

    pub fn add_ticket(
        &self,
        incident_id: Uuid,
        external_id: &str,
        system: &str,
        status: &str,
    ) -> Result<TicketRecord> {
        let record = TicketRecord {
            id: Uuid::new_v4(),
            incident_id,
            external_id: external_id.to_string(),
            system: system.to_string(),
            status: status.to_string(),
            at: Utc::now(),
        };
        let key = trail_key(
            incident_id,
            record.at.timestamp_millis().max(0) as u64,
            record.id,
        );
        let value = serde_json::to_vec(&record)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(TICKETS).map_err(store_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    /// Most recently created ticket for the incident, if any.
    pub fn latest_ticket(&self, incident_id: Uuid) -> Result<Option<TicketRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(TICKETS).map_err(store_err)?;
        let (low, high) = prefix_bounds::<40>(incident_id);
        let last = table
            .range(low.as_slice()..=high.as_slice())
            .map_err(store_err)?
            .last()
            .transpose()
            .map_err(store_err)?;
        match last {
            Some((_, v)) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, IncidentStore) {
        let dir = TempDir::new().unwrap();
        let store = IncidentStore::open(&dir.path().join("test.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_get_incident() {
        let (_dir, store) = open_tmp();
        let incident = Incident::new("tenant-1", "siem");
        store.create_incident(&incident).unwrap();

        let loaded = store.get_incident(incident.id).unwrap();
        assert_eq!(loaded.id, incident.id);
        assert_eq!(loaded.status, IncidentStatus::Received);
        assert_eq!(loaded.tenant_id, "tenant-1");
    }

    #[test]
    fn get_missing_incident_errors() {
        let (_dir, store) = open_tmp();
        let err = store.get_incident(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, TriageError::IncidentNotFound(_)));
    }

    #[test]
    fn set_status_on_missing_incident_is_noop() {
        let (_dir, store) = open_tmp();
        store
            .set_status(Uuid::new_v4(), IncidentStatus::Failed)
            .unwrap();
    }

    #[test]
    fn actions_sequence_in_append_order() {
        let (_dir, store) = open_tmp();
        let incident = Incident::new("t", "siem");
        store.create_incident(&incident).unwrap();

        store
            .append_action(incident.id, "received_alert", serde_json::json!({}))
            .unwrap();
        store
            .append_action(incident.id, "llm_plan", serde_json::json!({"steps": []}))
            .unwrap();
        store
            .append_action(incident.id, "summarize", serde_json::json!({}))
            .unwrap();

        let actions = store.list_actions(incident.id, 20, 0).unwrap();
        let kinds: Vec<&str> = actions.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, vec!["received_alert", "llm_plan", "summarize"]);
        assert_eq!(actions[0].seq, 1);
        assert_eq!(actions[2].seq, 3);
    }

    #[test]
    fn actions_do_not_leak_across_incidents() {
        let (_dir, store) = open_tmp();
        let a = Incident::new("t", "siem");
        let b = Incident::new("t", "siem");
        store.create_incident(&a).unwrap();
        store.create_incident(&b).unwrap();

        store
            .append_action(a.id, "received_alert", serde_json::json!({"n": 1}))
            .unwrap();
        store
            .append_action(b.id, "received_alert", serde_json::json!({"n": 2}))
            .unwrap();

        assert_eq!(store.count_actions(a.id).unwrap(), 1);
        let only = store.first_action_of_kind(b.id, "received_alert").unwrap().unwrap();
        assert_eq!(only.payload["n"], 2);
    }

    #[test]
    fn list_actions_paginates() {
        let (_dir, store) = open_tmp();
        let incident = Incident::new("t", "siem");
        store.create_incident(&incident).unwrap();
        for i in 0..5 {
            store
                .append_action(incident.id, "run_query", serde_json::json!({"i": i}))
                .unwrap();
        }

        let page = store.list_actions(incident.id, 2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].payload["i"], 2);
        assert_eq!(page[1].payload["i"], 3);
        assert_eq!(store.count_actions(incident.id).unwrap(), 5);
    }

    #[test]
    fn resolve_with_summary_sets_both_fields() {
        let (_dir, store) = open_tmp();
        let incident = Incident::new("t", "siem");
        store.create_incident(&incident).unwrap();

        store
            .resolve_with_summary(incident.id, "nothing to see")
            .unwrap();
        let loaded = store.get_incident(incident.id).unwrap();
        assert_eq!(loaded.status, IncidentStatus::Resolved);
        assert_eq!(loaded.summary.as_deref(), Some("nothing to see"));
    }

    #[test]
    fn latest_ticket_returns_newest() {
        let (_dir, store) = open_tmp();
        let incident = Incident::new("t", "siem");
        store.create_incident(&incident).unwrap();

        store
            .add_ticket(incident.id, "TCK-1", "local", "open")
            .unwrap();
        store
            .add_ticket(incident.id, "TCK-2", "local", "open")
            .unwrap();

        let latest = store.latest_ticket(incident.id).unwrap().unwrap();
        // Same-millisecond inserts tie on timestamp; either way a ticket exists
        // and duplicates are permitted.
        assert!(latest.external_id.starts_with("TCK-"));
    }

    #[test]
    fn evidence_listed_for_incident_only() {
        let (_dir, store) = open_tmp();
        let a = Incident::new("t", "siem");
        let b = Incident::new("t", "siem");
        store.create_incident(&a).unwrap();
        store.create_incident(&b).unwrap();

        store
            .add_evidence(a.id, "screenshot", "/tmp/a.png", Some("abc".into()))
            .unwrap();

        assert_eq!(store.list_evidence(a.id).unwrap().len(), 1);
        assert!(store.list_evidence(b.id).unwrap().is_empty());
    }
}
