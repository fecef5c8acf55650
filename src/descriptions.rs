//! Image description records and the durable store behind them.
//!
//! Two CSV tables live under the base directory:
//! - `descriptions.csv`: every captioned image, append-only
//! - `processed.csv`: the ledger of identities already pushed into the
//!   semantic index
//!
//! The ledger's keys, not the vector collection, are authoritative for
//! "has this already been indexed". Both tables are held in memory behind a
//! RwLock and written back atomically (temp file + rename). Every operation
//! is bounded by a timeout: 10s for row-level writes, 60s for full scans.

use std::collections::HashSet;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timeout for row-level operations.
pub const DB_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for full-table scans.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(60);

const DESCRIPTIONS_FILE: &str = "descriptions.csv";
const PROCESSED_FILE: &str = "processed.csv";

const CSV_HEADERS: [&str; 4] = ["id", "name", "description", "created_at"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// A captioned image. Created once by the captioning step, immutable
/// thereafter, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDescription {
    /// Store-assigned identity
    pub id: u64,
    /// Artifact file name, e.g. "red_car.jpg"
    pub name: String,
    /// Natural-language description of the image
    pub description: String,
    /// Store-assigned creation time
    pub created_at: DateTime<Utc>,
}

impl ImageDescription {
    /// Build a validated record; name and description must be non-empty.
    pub fn new(
        id: u64,
        name: String,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::EmptyField("name"));
        }
        if description.trim().is_empty() {
            return Err(StoreError::EmptyField("description"));
        }
        Ok(Self {
            id,
            name,
            description,
            created_at,
        })
    }
}

/// Ledger row recording that a description has been indexed. Exists if and
/// only if the identity was part of a successful index batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Equals the ImageDescription identity it derives from
    pub id: u64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// The durable store capability: keyed records with timeout-bounded
/// reads and writes. The seam exists so tests can inject a double.
pub trait DescriptionStore: Send + Sync {
    /// Read every description (full scan).
    fn all_descriptions(
        &self,
    ) -> impl Future<Output = Result<Vec<ImageDescription>, StoreError>> + Send;

    /// Read the set of identities already recorded in the ledger.
    fn processed_ids(&self) -> impl Future<Output = Result<HashSet<u64>, StoreError>> + Send;

    /// Append a new description; the store assigns identity and timestamp.
    fn add_description(
        &self,
        name: &str,
        description: &str,
    ) -> impl Future<Output = Result<ImageDescription, StoreError>> + Send;

    /// Record a description as indexed. Idempotent: re-adding an identity
    /// already in the ledger is a no-op.
    fn add_processed(
        &self,
        desc: &ImageDescription,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// CSV-backed store, one file per table under the base directory.
#[derive(Clone)]
pub struct CsvStore {
    descriptions: Arc<RwLock<Vec<ImageDescription>>>,
    processed: Arc<RwLock<Vec<ProcessedRecord>>>,
    base_dir: PathBuf,
}

impl CsvStore {
    /// Open the store, creating empty tables if they do not exist yet.
    pub fn load(base_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(base_dir)?;

        let descriptions = read_table(&base_dir.join(DESCRIPTIONS_FILE))?
            .into_iter()
            .map(|(id, name, description, created_at)| {
                ImageDescription::new(id, name, description, created_at)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let processed = read_table(&base_dir.join(PROCESSED_FILE))?
            .into_iter()
            .map(|(id, name, description, created_at)| ProcessedRecord {
                id,
                name,
                description,
                created_at,
            })
            .collect();

        Ok(Self {
            descriptions: Arc::new(RwLock::new(descriptions)),
            processed: Arc::new(RwLock::new(processed)),
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn save_descriptions(&self) -> Result<(), StoreError> {
        let rows: Vec<[String; 4]> = self
            .descriptions
            .read()
            .unwrap()
            .iter()
            .map(|d| {
                [
                    d.id.to_string(),
                    d.name.clone(),
                    d.description.clone(),
                    d.created_at.to_rfc3339(),
                ]
            })
            .collect();
        write_table(&self.base_dir.join(DESCRIPTIONS_FILE), &rows)
    }

    fn save_processed(&self) -> Result<(), StoreError> {
        let rows: Vec<[String; 4]> = self
            .processed
            .read()
            .unwrap()
            .iter()
            .map(|p| {
                [
                    p.id.to_string(),
                    p.name.clone(),
                    p.description.clone(),
                    p.created_at.to_rfc3339(),
                ]
            })
            .collect();
        write_table(&self.base_dir.join(PROCESSED_FILE), &rows)
    }
}

impl DescriptionStore for CsvStore {
    async fn all_descriptions(&self) -> Result<Vec<ImageDescription>, StoreError> {
        let store = self.clone();
        run_bounded(SCAN_TIMEOUT, move || {
            Ok(store.descriptions.read().unwrap().clone())
        })
        .await
    }

    async fn processed_ids(&self) -> Result<HashSet<u64>, StoreError> {
        let store = self.clone();
        run_bounded(SCAN_TIMEOUT, move || {
            Ok(store.processed.read().unwrap().iter().map(|p| p.id).collect())
        })
        .await
    }

    async fn add_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ImageDescription, StoreError> {
        let store = self.clone();
        let name = name.to_string();
        let description = description.to_string();

        run_bounded(DB_TIMEOUT, move || {
            let record = {
                let mut descriptions = store.descriptions.write().unwrap();
                let id = descriptions.iter().map(|d| d.id).max().unwrap_or(0) + 1;
                let record = ImageDescription::new(id, name, description, Utc::now())?;
                descriptions.push(record.clone());
                record
            };

            if let Err(e) = store.save_descriptions() {
                // Roll the in-memory row back so memory and disk agree
                store
                    .descriptions
                    .write()
                    .unwrap()
                    .retain(|d| d.id != record.id);
                return Err(e);
            }

            Ok(record)
        })
        .await
    }

    async fn add_processed(&self, desc: &ImageDescription) -> Result<(), StoreError> {
        let store = self.clone();
        let desc = desc.clone();

        run_bounded(DB_TIMEOUT, move || {
            {
                let mut processed = store.processed.write().unwrap();
                if processed.iter().any(|p| p.id == desc.id) {
                    log::debug!("Identity {} already in the ledger", desc.id);
                    return Ok(());
                }
                processed.push(ProcessedRecord {
                    id: desc.id,
                    name: desc.name.clone(),
                    description: desc.description.clone(),
                    created_at: Utc::now(),
                });
            }

            if let Err(e) = store.save_processed() {
                store.processed.write().unwrap().retain(|p| p.id != desc.id);
                return Err(e);
            }

            Ok(())
        })
        .await
    }
}

/// Run a blocking store operation off the async runtime, bounded by `limit`.
async fn run_bounded<T, F>(limit: Duration, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(op)).await {
        Err(_) => Err(StoreError::Timeout(limit)),
        Ok(Err(join)) => Err(StoreError::Task(join.to_string())),
        Ok(Ok(result)) => result,
    }
}

type Row = (u64, String, String, DateTime<Utc>);

fn read_table(path: &Path) -> Result<Vec<Row>, StoreError> {
    if let Err(err) = std::fs::metadata(path) {
        match err.kind() {
            ErrorKind::NotFound => {
                log::info!("Creating new table at {}", path.display());
                let mut csv_wrt = csv::Writer::from_path(path)?;
                csv_wrt.write_record(CSV_HEADERS)?;
                csv_wrt.flush()?;
            }
            _ => Err(err)?,
        }
    }

    let mut csv_reader = csv::Reader::from_path(path)?;
    let mut rows = vec![];

    for record in csv_reader.records() {
        let record = record?;
        let field = |i: usize, what: &str| {
            record
                .get(i)
                .map(|s| s.to_string())
                .ok_or_else(|| StoreError::Malformed(format!("missing {what} column")))
        };

        let id = field(0, "id")?
            .parse::<u64>()
            .map_err(|e| StoreError::Malformed(format!("bad id: {e}")))?;
        let name = field(1, "name")?;
        let description = field(2, "description")?;
        let created_at = DateTime::parse_from_rfc3339(&field(3, "created_at")?)
            .map_err(|e| StoreError::Malformed(format!("bad created_at: {e}")))?
            .with_timezone(&Utc);

        rows.push((id, name, description, created_at));
    }

    Ok(rows)
}

fn write_table(path: &Path, rows: &[[String; 4]]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("csv-tmp");

    let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
    csv_wrt.write_record(CSV_HEADERS)?;
    for row in rows {
        csv_wrt.write_record(row)?;
    }
    csv_wrt.flush()?;
    drop(csv_wrt);

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
