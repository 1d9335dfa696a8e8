//! Registry Store: append-only NDJSON tables for expected counts,
//! quarantine, at-large, and the audit log, plus an in-memory backend for
//! tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::entries::{AtLargeEntry, AuditAction, AuditEntry, ExpectedCountEntry, QuarantineEntry, RegistryName};

/// Error surface for registry store operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying filesystem I/O failed.
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A registry file's contents could not be parsed as NDJSON.
    #[error("malformed registry file {path}: {source}")]
    Malformed {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The FIPS was not present in the table the caller expected it in.
    #[error("fips {0} not found")]
    NotFound(String),
    /// The FIPS is already present where the caller expected it absent.
    #[error("fips {0} already exists")]
    AlreadyExists(String),
}

/// Header line written at the top of every NDJSON registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryHeader {
    #[serde(rename = "_schema")]
    schema: String,
    #[serde(rename = "_type")]
    entry_type: String,
    #[serde(rename = "_count")]
    count: usize,
    #[serde(rename = "_extracted")]
    extracted: chrono::DateTime<Utc>,
    #[serde(rename = "_description")]
    description: String,
}

/// Generic append-only NDJSON table keyed by FIPS. Entries are kept sorted
/// by FIPS ascending on every write, and writes are atomic (temp file then
/// rename).
struct NdjsonTable<T> {
    path: PathBuf,
    schema: &'static str,
    entry_type: &'static str,
    description: &'static str,
    entries: BTreeMap<String, T>,
}

impl<T> NdjsonTable<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Clone,
{
    fn new(path: PathBuf, schema: &'static str, entry_type: &'static str, description: &'static str) -> Self {
        Self { path, schema, entry_type, description, entries: BTreeMap::new() }
    }

    async fn load(path: PathBuf, schema: &'static str, entry_type: &'static str, description: &'static str, fips_of: impl Fn(&T) -> String) -> Result<Self, RegistryError> {
        let mut table = Self::new(path.clone(), schema, entry_type, description);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(table);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let mut lines = contents.lines();
        // The header line is informational; entries are the source of truth
        // for `count`, recomputed on every save.
        let _header = lines.next();
        let body_lines: Vec<&str> = lines.collect();
        for (idx, line) in body_lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(entry) => {
                    table.entries.insert(fips_of(&entry), entry);
                }
                Err(e) => {
                    // Tolerate a malformed trailing line (a write interrupted
                    // mid-append); any malformed line before the last is a
                    // genuine corruption and is reported.
                    if idx == body_lines.len() - 1 {
                        break;
                    }
                    return Err(RegistryError::Malformed { path, source: e });
                }
            }
        }
        Ok(table)
    }

    async fn save(&self) -> Result<(), RegistryError> {
        let header = RegistryHeader {
            schema: self.schema.to_string(),
            entry_type: self.entry_type.to_string(),
            count: self.entries.len(),
            extracted: Utc::now(),
            description: self.description.to_string(),
        };
        let mut buf = serde_json::to_string(&header).expect("header serializes");
        buf.push('\n');
        for entry in self.entries.values() {
            buf.push_str(&serde_json::to_string(entry).expect("entry serializes"));
            buf.push('\n');
        }
        let tmp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp_path, buf).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Storage seam for the registry tables and the audit log. Implementations
/// must serialize writes per table so concurrent callers never interleave a
/// read-modify-write cycle.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Look up an expected-count entry by FIPS.
    async fn expected_count(&self, fips: &str) -> Result<Option<ExpectedCountEntry>, RegistryError>;
    /// Look up a quarantine entry by FIPS.
    async fn quarantine_entry(&self, fips: &str) -> Result<Option<QuarantineEntry>, RegistryError>;
    /// Look up an at-large entry by FIPS.
    async fn at_large_entry(&self, fips: &str) -> Result<Option<AtLargeEntry>, RegistryError>;

    /// Add a new expected-count entry.
    async fn add_expected_count(&self, entry: ExpectedCountEntry, actor: &str, reason: &str) -> Result<(), RegistryError>;

    /// Quarantine a FIPS. When `before_expected_count` is `Some`, the
    /// matching expected-count entry's `confidence` is reset to zero and
    /// persisted, and the audit entry's `before`/`after` capture that
    /// confidence transition (`before.confidence != after.confidence`); a
    /// quarantine with no matching expected-count entry audits only the
    /// new quarantine-table row.
    async fn quarantine(
        &self,
        entry: QuarantineEntry,
        before_expected_count: Option<ExpectedCountEntry>,
        actor: &str,
    ) -> Result<(), RegistryError>;

    /// Lift a quarantine, recording an audit entry.
    async fn restore(&self, fips: &str, actor: &str, reason: &str) -> Result<(), RegistryError>;

    /// Promote a quarantined FIPS to at-large, recording an audit entry.
    async fn promote(&self, fips: &str, entry: AtLargeEntry, actor: &str, reason: &str) -> Result<(), RegistryError>;

    /// The full audit log, in append order.
    async fn audit_log(&self) -> Result<Vec<AuditEntry>, RegistryError>;
}

/// NDJSON-file-backed [`RegistryStore`].
pub struct FileRegistryStore {
    dir: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileRegistryStore {
    /// Construct a store rooted at `dir`, which holds
    /// `expected_counts.ndjson`, `quarantine.ndjson`, `at_large.ndjson`, and
    /// `audit.ndjson`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: tokio::sync::Mutex::new(()) }
    }

    fn expected_count_path(&self) -> PathBuf {
        self.dir.join("expected_counts.ndjson")
    }

    fn quarantine_path(&self) -> PathBuf {
        self.dir.join("quarantine.ndjson")
    }

    fn at_large_path(&self) -> PathBuf {
        self.dir.join("at_large.ndjson")
    }

    fn audit_path(&self) -> PathBuf {
        self.dir.join("audit.ndjson")
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), RegistryError> {
        let path = self.audit_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry).expect("audit entry serializes");
        line.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FileRegistryStore {
    async fn expected_count(&self, fips: &str) -> Result<Option<ExpectedCountEntry>, RegistryError> {
        let table = NdjsonTable::<ExpectedCountEntry>::load(
            self.expected_count_path(),
            "boundary-kernel/expected-counts/v1",
            "expected_count",
            "Expected district counts per city",
            |e| e.fips.clone(),
        )
        .await?;
        Ok(table.entries.get(fips).cloned())
    }

    async fn quarantine_entry(&self, fips: &str) -> Result<Option<QuarantineEntry>, RegistryError> {
        let table = NdjsonTable::<QuarantineEntry>::load(
            self.quarantine_path(),
            "boundary-kernel/quarantine/v1",
            "quarantine",
            "Quarantined FIPS codes",
            |e| e.fips.clone(),
        )
        .await?;
        Ok(table.entries.get(fips).cloned())
    }

    async fn at_large_entry(&self, fips: &str) -> Result<Option<AtLargeEntry>, RegistryError> {
        let table = NdjsonTable::<AtLargeEntry>::load(
            self.at_large_path(),
            "boundary-kernel/at-large/v1",
            "at_large",
            "At-large cities with no district geometry",
            |e| e.fips.clone(),
        )
        .await?;
        Ok(table.entries.get(fips).cloned())
    }

    async fn add_expected_count(&self, entry: ExpectedCountEntry, actor: &str, reason: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        let mut table = NdjsonTable::<ExpectedCountEntry>::load(
            self.expected_count_path(),
            "boundary-kernel/expected-counts/v1",
            "expected_count",
            "Expected district counts per city",
            |e| e.fips.clone(),
        )
        .await?;
        if table.entries.contains_key(&entry.fips) {
            return Err(RegistryError::AlreadyExists(entry.fips));
        }
        let fips = entry.fips.clone();
        table.entries.insert(fips.clone(), entry.clone());
        table.save().await?;
        self.append_audit(&AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: AuditAction::Add,
            registry: RegistryName::ExpectedCount,
            fips,
            actor: actor.to_string(),
            reason: reason.to_string(),
            before: None,
            after: Some(serde_json::to_value(&entry).expect("entry serializes")),
        })
        .await
    }

    async fn quarantine(
        &self,
        entry: QuarantineEntry,
        before_expected_count: Option<ExpectedCountEntry>,
        actor: &str,
    ) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        let mut table = NdjsonTable::<QuarantineEntry>::load(
            self.quarantine_path(),
            "boundary-kernel/quarantine/v1",
            "quarantine",
            "Quarantined FIPS codes",
            |e| e.fips.clone(),
        )
        .await?;
        let fips = entry.fips.clone();
        let reason = entry.reason.clone();
        table.entries.insert(fips.clone(), entry.clone());
        table.save().await?;

        let (before, after) = match before_expected_count {
            Some(before) => {
                let after = ExpectedCountEntry { confidence: 0, ..before.clone() };
                let mut expected_table = NdjsonTable::<ExpectedCountEntry>::load(
                    self.expected_count_path(),
                    "boundary-kernel/expected-counts/v1",
                    "expected_count",
                    "Expected district counts per city",
                    |e| e.fips.clone(),
                )
                .await?;
                expected_table.entries.insert(fips.clone(), after.clone());
                expected_table.save().await?;
                (
                    Some(serde_json::to_value(&before).expect("entry serializes")),
                    Some(serde_json::to_value(&after).expect("entry serializes")),
                )
            }
            None => (None, Some(serde_json::to_value(&entry).expect("entry serializes"))),
        };

        self.append_audit(&AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: AuditAction::Quarantine,
            registry: RegistryName::Quarantine,
            fips,
            actor: actor.to_string(),
            reason,
            before,
            after,
        })
        .await
    }

    async fn restore(&self, fips: &str, actor: &str, reason: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        let mut table = NdjsonTable::<QuarantineEntry>::load(
            self.quarantine_path(),
            "boundary-kernel/quarantine/v1",
            "quarantine",
            "Quarantined FIPS codes",
            |e| e.fips.clone(),
        )
        .await?;
        let removed = table.entries.remove(fips).ok_or_else(|| RegistryError::NotFound(fips.to_string()))?;
        table.save().await?;
        self.append_audit(&AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: AuditAction::Restore,
            registry: RegistryName::Quarantine,
            fips: fips.to_string(),
            actor: actor.to_string(),
            reason: reason.to_string(),
            before: Some(serde_json::to_value(&removed).expect("entry serializes")),
            after: None,
        })
        .await
    }

    async fn promote(&self, fips: &str, entry: AtLargeEntry, actor: &str, reason: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        let mut quarantine_table = NdjsonTable::<QuarantineEntry>::load(
            self.quarantine_path(),
            "boundary-kernel/quarantine/v1",
            "quarantine",
            "Quarantined FIPS codes",
            |e| e.fips.clone(),
        )
        .await?;
        let removed = quarantine_table.entries.remove(fips);
        quarantine_table.save().await?;

        let mut at_large_table = NdjsonTable::<AtLargeEntry>::load(
            self.at_large_path(),
            "boundary-kernel/at-large/v1",
            "at_large",
            "At-large cities with no district geometry",
            |e| e.fips.clone(),
        )
        .await?;
        at_large_table.entries.insert(fips.to_string(), entry.clone());
        at_large_table.save().await?;

        self.append_audit(&AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: AuditAction::Promote,
            registry: RegistryName::AtLarge,
            fips: fips.to_string(),
            actor: actor.to_string(),
            reason: reason.to_string(),
            before: removed.map(|e| serde_json::to_value(&e).expect("entry serializes")),
            after: Some(serde_json::to_value(&entry).expect("entry serializes")),
        })
        .await
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>, RegistryError> {
        let path = self.audit_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut entries = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    if idx == lines.len() - 1 {
                        break;
                    }
                    return Err(RegistryError::Malformed { path, source: e });
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::entries::{FailurePattern, GovernanceType};

    fn temp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("boundary-kernel-registry-test-{}", Uuid::new_v4()));
        dir
    }

    fn expected_count(fips: &str) -> ExpectedCountEntry {
        ExpectedCountEntry {
            fips: fips.to_string(),
            city_name: "Example City".to_string(),
            state: "WI".to_string(),
            expected_count: 8,
            governance_type: GovernanceType::DistrictBased,
            source_url: "https://example.gov/districts".to_string(),
            last_verified: Utc::now(),
            confidence: 100,
        }
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips() {
        let store = FileRegistryStore::new(temp_dir());
        let entry = expected_count("5553000");
        store.add_expected_count(entry.clone(), "tester", "seed fixture").await.unwrap();
        let fetched = store.expected_count("5553000").await.unwrap();
        assert_eq!(fetched, Some(entry));
    }

    #[tokio::test]
    async fn add_duplicate_fips_fails() {
        let store = FileRegistryStore::new(temp_dir());
        let entry = expected_count("5553000");
        store.add_expected_count(entry.clone(), "tester", "seed fixture").await.unwrap();
        let result = store.add_expected_count(entry, "tester", "seed fixture").await;
        assert!(matches!(result, Err(RegistryError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn quarantine_then_restore_round_trips_and_audits() {
        let store = FileRegistryStore::new(temp_dir());
        let entry = QuarantineEntry {
            fips: "0999999".to_string(),
            city_name: "Test City".to_string(),
            state: "ZZ".to_string(),
            failure_pattern: FailurePattern::Other,
            reason: "test".to_string(),
            timestamp: Utc::now(),
        };
        store.quarantine(entry.clone(), None, "tester").await.unwrap();
        assert_eq!(store.quarantine_entry("0999999").await.unwrap(), Some(entry));

        store.restore("0999999", "tester", "resolved").await.unwrap();
        assert_eq!(store.quarantine_entry("0999999").await.unwrap(), None);

        let audit = store.audit_log().await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AuditAction::Quarantine);
        assert_eq!(audit[1].action, AuditAction::Restore);
    }

    #[tokio::test]
    async fn quarantine_resets_expected_count_confidence_to_zero_and_audits_the_change() {
        let store = FileRegistryStore::new(temp_dir());
        let before = expected_count("0999999");
        store.add_expected_count(before.clone(), "tester", "seed fixture").await.unwrap();

        let entry = QuarantineEntry {
            fips: "0999999".to_string(),
            city_name: "Test City".to_string(),
            state: "ZZ".to_string(),
            failure_pattern: FailurePattern::Other,
            reason: "test".to_string(),
            timestamp: Utc::now(),
        };
        store.quarantine(entry, Some(before.clone()), "tester").await.unwrap();

        let after = store.expected_count("0999999").await.unwrap().unwrap();
        assert_eq!(after.confidence, 0);

        let audit = store.audit_log().await.unwrap();
        let quarantine_audit = audit.iter().find(|a| a.action == AuditAction::Quarantine).unwrap();
        let before_confidence = quarantine_audit.before.as_ref().unwrap()["confidence"].as_u64().unwrap();
        let after_confidence = quarantine_audit.after.as_ref().unwrap()["confidence"].as_u64().unwrap();
        assert_ne!(before_confidence, after_confidence);
        assert_eq!(after_confidence, 0);
    }

    #[tokio::test]
    async fn restore_of_missing_fips_fails() {
        let store = FileRegistryStore::new(temp_dir());
        let result = store.restore("0000000", "tester", "n/a").await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn promote_moves_entry_from_quarantine_to_at_large() {
        let store = FileRegistryStore::new(temp_dir());
        let quarantine = QuarantineEntry {
            fips: "0999999".to_string(),
            city_name: "Test City".to_string(),
            state: "ZZ".to_string(),
            failure_pattern: FailurePattern::SingleFeature,
            reason: "only one district published".to_string(),
            timestamp: Utc::now(),
        };
        store.quarantine(quarantine, None, "tester").await.unwrap();

        let at_large = AtLargeEntry {
            fips: "0999999".to_string(),
            name: "Test City".to_string(),
            state: "ZZ".to_string(),
            council_size: 5,
            election_method: crate::registry::entries::ElectionMethod::AtLarge,
            source: "https://example.gov/council".to_string(),
        };
        store.promote("0999999", at_large.clone(), "tester", "confirmed at-large").await.unwrap();

        assert_eq!(store.quarantine_entry("0999999").await.unwrap(), None);
        assert_eq!(store.at_large_entry("0999999").await.unwrap(), Some(at_large));
    }
}
