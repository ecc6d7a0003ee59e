//! File-backed model store
//!
//! Layout under the data directory:
//!
//! ```text
//! base/regressor.json          shared base regressor (read-only here)
//! base/scaler.json             shared base scaler
//! users/<uid>/regressor.json   per-user regressor (retrained)
//! users/<uid>/scaler.json      per-user scaler (copied once, never refit)
//! users/<uid>/transactions.csv deduplicated transaction log
//! users/<uid>/metadata.json    training metadata and blend weights
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! over the destination, so readers never observe a partial artifact.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ml::{DenseRegressor, FeatureScaler, Regressor, StandardScaler};
use crate::models::{ModelMetadata, TransactionRecord};

pub const REGRESSOR_FILE: &str = "regressor.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const METADATA_FILE: &str = "metadata.json";

const BASE_DIR: &str = "base";
const USERS_DIR: &str = "users";
const MAX_USER_ID_LEN: usize = 128;

/// Reject identifiers that could escape the users directory
pub fn validate_user_id(uid: &str) -> Result<()> {
    let valid_chars = uid
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if uid.is_empty()
        || uid.len() > MAX_USER_ID_LEN
        || uid == "."
        || uid == ".."
        || !valid_chars
    {
        return Err(Error::InvalidInput(format!("Invalid user id: {:?}", uid)));
    }
    Ok(())
}

/// Result of merging new records into a user's log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendSummary {
    pub added: usize,
    pub duplicates: usize,
    pub transaction_count: usize,
}

/// Per-user artifact store layered on shared base artifacts
#[derive(Debug, Clone)]
pub struct ModelStore<R = DenseRegressor, S = StandardScaler> {
    root: PathBuf,
    _artifacts: PhantomData<fn() -> (R, S)>,
}

impl<R: Regressor, S: FeatureScaler> ModelStore<R, S> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _artifacts: PhantomData,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_dir(&self) -> PathBuf {
        self.root.join(BASE_DIR)
    }

    /// Directory for a user's artifacts
    pub fn user_dir(&self, uid: &str) -> Result<PathBuf> {
        validate_user_id(uid)?;
        Ok(self.root.join(USERS_DIR).join(uid))
    }

    fn user_file(&self, uid: &str, name: &str) -> Result<PathBuf> {
        Ok(self.user_dir(uid)?.join(name))
    }

    // ========== Base artifacts ==========

    pub fn has_base_artifacts(&self) -> bool {
        let base = self.base_dir();
        base.join(REGRESSOR_FILE).is_file() && base.join(SCALER_FILE).is_file()
    }

    pub fn load_base_regressor(&self) -> Result<R> {
        read_json(&self.base_dir().join(REGRESSOR_FILE))
    }

    pub fn load_base_scaler(&self) -> Result<S> {
        read_json(&self.base_dir().join(SCALER_FILE))
    }

    /// Install a new base model (what an external training job produces)
    pub fn save_base_artifacts(&self, regressor: &R, scaler: &S) -> Result<()> {
        let base = self.base_dir();
        write_json(&base.join(SCALER_FILE), scaler)?;
        write_json(&base.join(REGRESSOR_FILE), regressor)?;
        info!("Saved base model artifacts to {}", base.display());
        Ok(())
    }

    // ========== User lifecycle ==========

    pub fn is_initialized(&self, uid: &str) -> Result<bool> {
        let dir = self.user_dir(uid)?;
        Ok(dir.join(REGRESSOR_FILE).is_file() && dir.join(SCALER_FILE).is_file())
    }

    /// Bootstrap a user's regressor and scaler from the base model.
    ///
    /// Returns `true` when the user was initialized by this call.
    pub fn ensure_initialized(&self, uid: &str) -> Result<bool> {
        if self.is_initialized(uid)? {
            return Ok(false);
        }

        if !self.has_base_artifacts() {
            return Err(Error::StorageUnavailable(format!(
                "Base model artifacts not found in {}",
                self.base_dir().display()
            )));
        }

        // Round-trip through the types so a half-written base artifact is
        // rejected instead of copied
        let regressor = self.load_base_regressor()?;
        let scaler = self.load_base_scaler()?;

        // Never replace artifacts a concurrent caller already wrote, such
        // as a regressor trained between the check above and these writes
        let dir = self.user_dir(uid)?;
        let scaler_created = create_json(&dir.join(SCALER_FILE), &scaler)?;
        let regressor_created = create_json(&dir.join(REGRESSOR_FILE), &regressor)?;
        self.load_metadata(uid)?;

        if !(scaler_created || regressor_created) {
            return Ok(false);
        }
        info!(user = uid, "Initialized user model from base model");
        Ok(true)
    }

    /// All user ids with a model directory, sorted
    pub fn list_users(&self) -> Result<Vec<String>> {
        let users_dir = self.root.join(USERS_DIR);
        if !users_dir.exists() {
            return Ok(Vec::new());
        }

        let mut users = Vec::new();
        for entry in fs::read_dir(&users_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_user_id(name).is_ok() {
                    users.push(name.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }

    // ========== Metadata ==========

    /// Read a user's metadata, creating and persisting defaults on first read.
    ///
    /// Defaults only land when no metadata exists yet; if another writer
    /// got there first, its record is read back instead.
    pub fn load_metadata(&self, uid: &str) -> Result<ModelMetadata> {
        let path = self.user_file(uid, METADATA_FILE)?;
        if path.is_file() {
            return read_json(&path);
        }

        let metadata = ModelMetadata::default();
        if !create_json(&path, &metadata)? {
            return read_json(&path);
        }
        debug!(user = uid, "Created default model metadata");
        Ok(metadata)
    }

    /// Read a user's metadata without creating anything on disk
    pub fn peek_metadata(&self, uid: &str) -> Result<ModelMetadata> {
        let path = self.user_file(uid, METADATA_FILE)?;
        if path.is_file() {
            return read_json(&path);
        }
        Ok(ModelMetadata::default())
    }

    pub fn save_metadata(&self, uid: &str, metadata: &ModelMetadata) -> Result<()> {
        write_json(&self.user_file(uid, METADATA_FILE)?, metadata)
    }

    // ========== Transaction log ==========

    pub fn load_transaction_log(&self, uid: &str) -> Result<Vec<TransactionRecord>> {
        let path = self.user_file(uid, TRANSACTIONS_FILE)?;
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }

    /// Merge records into the log, dropping ids already seen (first wins),
    /// then persist the log and the refreshed transaction count.
    pub fn append_transactions(
        &self,
        uid: &str,
        records: &[TransactionRecord],
    ) -> Result<AppendSummary> {
        for record in records {
            record.validate()?;
        }

        let existing = self.load_transaction_log(uid)?;
        let before = existing.len();
        let (merged, duplicates) = merge_records(existing, records);
        let added = merged.len() - before;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &merged {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::StorageUnavailable(format!("Failed to encode log: {}", e)))?;
        write_atomic(&self.user_file(uid, TRANSACTIONS_FILE)?, &bytes)?;

        let mut metadata = self.load_metadata(uid)?;
        metadata.transaction_count = merged.len();
        self.save_metadata(uid, &metadata)?;

        debug!(
            user = uid,
            added, duplicates, total = merged.len(),
            "Appended transactions"
        );

        Ok(AppendSummary {
            added,
            duplicates,
            transaction_count: merged.len(),
        })
    }

    // ========== User artifacts ==========

    pub fn load_regressor(&self, uid: &str) -> Result<R> {
        read_json(&self.user_file(uid, REGRESSOR_FILE)?)
    }

    pub fn save_regressor(&self, uid: &str, regressor: &R) -> Result<()> {
        write_json(&self.user_file(uid, REGRESSOR_FILE)?, regressor)
    }

    pub fn load_scaler(&self, uid: &str) -> Result<S> {
        read_json(&self.user_file(uid, SCALER_FILE)?)
    }
}

fn merge_records(
    existing: Vec<TransactionRecord>,
    incoming: &[TransactionRecord],
) -> (Vec<TransactionRecord>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    let mut duplicates = 0;

    for record in existing.into_iter().chain(incoming.iter().cloned()) {
        match record.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) if !seen.insert(id.to_string()) => duplicates += 1,
            _ => merged.push(record),
        }
    }

    (merged, duplicates)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            Error::StorageUnavailable(format!("Artifact not found: {}", path.display()))
        }
        _ => Error::StorageUnavailable(format!("Failed to read {}: {}", path.display(), e)),
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        Error::StorageUnavailable(format!("Unreadable artifact {}: {}", path.display(), e))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Write `value` only if `path` does not exist yet.
///
/// Returns `false` when an existing file was left in place.
fn create_json<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = staged_temp_file(path, &bytes)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::StorageUnavailable(format!(
            "Failed to persist {}: {}",
            path.display(),
            e.error
        ))),
    }
}

/// Write-to-temp-then-rename within the destination directory
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = staged_temp_file(path, bytes)?;
    tmp.persist(path).map_err(|e| {
        Error::StorageUnavailable(format!("Failed to persist {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Temp file next to `path`, holding `bytes` flushed to disk
fn staged_temp_file(path: &Path, bytes: &[u8]) -> Result<tempfile::NamedTempFile> {
    let dir = path.parent().ok_or_else(|| {
        Error::StorageUnavailable(format!("No parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(dir).map_err(|e| {
        Error::StorageUnavailable(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use crate::test_utils::{fixture_store, install_constant_base, ConstantRegressor};
    use tempfile::TempDir;

    fn tx(id: Option<&str>, amount: f64, date: &str) -> TransactionRecord {
        let record = TransactionRecord::new(TransactionType::Expense, amount, date);
        match id {
            Some(id) => record.with_id(id),
            None => record,
        }
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("user-42").is_ok());
        assert!(validate_user_id("64b7f0c2e1a9").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("..").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id("a/b").is_err());
        assert!(validate_user_id(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_ensure_initialized_requires_base() {
        let dir = TempDir::new().unwrap();
        let store: ModelStore<ConstantRegressor> = ModelStore::new(dir.path());
        let result = store.ensure_initialized("alice");
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
        assert!(!store.is_initialized("alice").unwrap());
    }

    #[test]
    fn test_ensure_initialized_copies_base() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);

        assert!(store.ensure_initialized("alice").unwrap());
        assert!(!store.ensure_initialized("alice").unwrap());

        let regressor = store.load_regressor("alice").unwrap();
        assert_eq!(regressor.value, 6000.0);
        assert_eq!(
            store.load_scaler("alice").unwrap(),
            store.load_base_scaler().unwrap()
        );

        let meta = store.load_metadata("alice").unwrap();
        assert_eq!(meta.base_weight, 1.0);
        assert_eq!(meta.personal_weight, 0.0);
        assert_eq!(meta.transaction_count, 0);
    }

    #[test]
    fn test_user_model_independent_of_later_base_changes() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store.ensure_initialized("alice").unwrap();

        install_constant_base(&store, 9000.0);
        assert_eq!(store.load_regressor("alice").unwrap().value, 6000.0);
    }

    #[test]
    fn test_metadata_created_on_first_read() {
        let (_dir, store) = fixture_store();
        let first = store.load_metadata("bob").unwrap();
        let second = store.load_metadata("bob").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_peek_metadata_does_not_persist() {
        let (_dir, store) = fixture_store();
        let meta = store.peek_metadata("hal").unwrap();
        assert_eq!(meta.transaction_count, 0);
        assert!(!store.user_dir("hal").unwrap().exists());
        assert!(store.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_default_metadata_never_overwrites_saved_record() {
        let (_dir, store) = fixture_store();
        let mut saved = ModelMetadata::default();
        saved.transaction_count = 12;
        store.save_metadata("ivy", &saved).unwrap();

        let path = store.user_dir("ivy").unwrap().join(METADATA_FILE);
        assert!(!create_json(&path, &ModelMetadata::default()).unwrap());
        assert_eq!(store.load_metadata("ivy").unwrap().transaction_count, 12);
    }

    #[test]
    fn test_bootstrap_keeps_existing_regressor() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store
            .save_regressor("jon", &ConstantRegressor::new(7500.0))
            .unwrap();

        // Scaler still missing, so the user counts as uninitialized
        store.ensure_initialized("jon").unwrap();
        assert!(store.is_initialized("jon").unwrap());
        assert_eq!(store.load_regressor("jon").unwrap().value, 7500.0);
    }

    #[test]
    fn test_empty_log_when_missing() {
        let (_dir, store) = fixture_store();
        assert!(store.load_transaction_log("carol").unwrap().is_empty());
    }

    #[test]
    fn test_append_dedupes_by_id_first_wins() {
        let (_dir, store) = fixture_store();

        let first = vec![
            tx(Some("a"), 10.0, "2024-01-01"),
            tx(Some("b"), 20.0, "2024-01-02"),
            tx(None, 5.0, "2024-01-03"),
        ];
        let summary = store.append_transactions("dave", &first).unwrap();
        assert_eq!(summary.added, 3);
        assert_eq!(summary.transaction_count, 3);

        let second = vec![
            tx(Some("b"), 999.0, "2024-02-02"),
            tx(Some("c"), 30.0, "2024-02-03"),
            tx(Some("c"), 31.0, "2024-02-04"),
            tx(None, 5.0, "2024-01-03"),
        ];
        let summary = store.append_transactions("dave", &second).unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(summary.transaction_count, 5);

        let log = store.load_transaction_log("dave").unwrap();
        let amounts: Vec<f64> = log.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![10.0, 20.0, 5.0, 30.0, 5.0]);
        assert_eq!(log[0].id.as_deref(), Some("a"));
        assert!(log[2].id.is_none());

        assert_eq!(store.load_metadata("dave").unwrap().transaction_count, 5);
    }

    #[test]
    fn test_append_rejects_bad_dates_without_writing() {
        let (_dir, store) = fixture_store();
        let records = vec![tx(Some("a"), 10.0, "2024-01-01"), tx(None, 1.0, "soon")];

        let result = store.append_transactions("erin", &records);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.load_transaction_log("erin").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_regressor_is_storage_error() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store.ensure_initialized("frank").unwrap();

        let path = store.user_dir("frank").unwrap().join(REGRESSOR_FILE);
        fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(
            store.load_regressor("frank"),
            Err(Error::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_list_users() {
        let (_dir, store) = fixture_store();
        store.load_metadata("zed").unwrap();
        store.load_metadata("amy").unwrap();
        assert_eq!(store.list_users().unwrap(), vec!["amy", "zed"]);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store.ensure_initialized("gina").unwrap();
        store
            .save_regressor("gina", &ConstantRegressor::new(7000.0))
            .unwrap();

        let names: Vec<String> = fs::read_dir(store.user_dir("gina").unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with(".tmp")));
        assert_eq!(store.load_regressor("gina").unwrap().value, 7000.0);
    }
}
