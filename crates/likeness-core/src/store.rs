//! Face record store — a CSV file of `(label, face_encoding, timestamp)` rows,
//! loaded fully at open and rewritten on every append.
//!
//! The `face_encoding` column holds the embedding as a bracketed float list
//! (`[0.1, -0.2, ...]`). It is parsed strictly as a JSON array of numbers and
//! must match the store's dimension; any row that fails is a load error.

use crate::types::{Embedding, FaceRecord};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp column format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read face store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed face store {} at row {row}: {reason}", .path.display())]
    Load {
        path: PathBuf,
        row: usize,
        reason: String,
    },
    #[error("failed to write face store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("embedding has {actual} dimensions, store expects {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("label must not be empty")]
    EmptyLabel,
}

/// On-disk row layout. Column names are part of the file format.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    label: String,
    face_encoding: String,
    timestamp: String,
}

/// Durable, append-only set of face records with a per-label index.
#[derive(Debug)]
pub struct FaceStore {
    path: PathBuf,
    dimension: usize,
    records: Vec<FaceRecord>,
    /// label -> indices into `records`, in insertion order.
    index: HashMap<String, Vec<usize>>,
    /// Labels in order of first enrollment.
    labels: Vec<String>,
}

impl FaceStore {
    /// Open the store at `path`, loading every record.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first append. Any malformed row fails the whole open.
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Self {
            path,
            dimension,
            records: Vec::new(),
            index: HashMap::new(),
            labels: Vec::new(),
        };

        if !store.path.exists() {
            tracing::info!(path = %store.path.display(), "no face store on disk, starting empty");
            return Ok(store);
        }

        let records = read_records(&store.path, dimension)?;
        for record in records {
            store.insert(record);
        }

        tracing::info!(
            path = %store.path.display(),
            records = store.records.len(),
            labels = store.labels.len(),
            dimension,
            "face store loaded"
        );
        Ok(store)
    }

    /// Persist a new record, then add it to the in-memory index.
    ///
    /// The whole file is rewritten through a sibling temporary file and
    /// renamed into place, so a failed write leaves both the file and the
    /// in-memory state untouched.
    pub fn append(
        &mut self,
        label: &str,
        embedding: Embedding,
        enrolled_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        self.check_embedding(&embedding)?;

        let record = FaceRecord {
            label: label.to_string(),
            embedding,
            enrolled_at,
        };

        write_records(&self.path, self.records.iter().chain(std::iter::once(&record)))
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(
            label,
            records = self.records.len() + 1,
            path = %self.path.display(),
            "face record persisted"
        );
        self.insert(record);
        Ok(())
    }

    /// Every stored sample as a matching candidate, in record order.
    pub fn labels_and_embeddings(&self) -> impl Iterator<Item = (&str, &Embedding)> + '_ {
        self.records
            .iter()
            .map(|r| (r.label.as_str(), &r.embedding))
    }

    pub fn records(&self) -> &[FaceRecord] {
        &self.records
    }

    /// Distinct labels in order of first enrollment.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn embeddings_for<'a>(&'a self, label: &str) -> impl Iterator<Item = &'a Embedding> + 'a {
        self.index
            .get(label)
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i].embedding)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End of the store's lifecycle. Every append is already durable.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "face store closed");
    }

    /// Validate an embedding against the store's shape without storing it.
    pub fn check_embedding(&self, embedding: &Embedding) -> Result<(), StoreError> {
        if embedding.dimension() != self.dimension {
            return Err(StoreError::Dimension {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        if embedding.values.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::NonFinite);
        }
        Ok(())
    }

    fn insert(&mut self, record: FaceRecord) {
        let idx = self.records.len();
        match self.index.get_mut(&record.label) {
            Some(slots) => slots.push(idx),
            None => {
                self.labels.push(record.label.clone());
                self.index.insert(record.label.clone(), vec![idx]);
            }
        }
        self.records.push(record);
    }
}

/// Parse the embedding column: a bracketed list of exactly `dimension` finite floats.
pub fn parse_encoding(text: &str, dimension: usize) -> Result<Embedding, String> {
    let values: Vec<f32> =
        serde_json::from_str(text.trim()).map_err(|e| format!("face_encoding is not a float list: {e}"))?;
    if values.len() != dimension {
        return Err(format!(
            "face_encoding has {} values, expected {dimension}",
            values.len()
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("face_encoding contains non-finite values".to_string());
    }
    Ok(Embedding::new(values))
}

/// Render an embedding for the `face_encoding` column.
pub fn format_encoding(embedding: &Embedding) -> String {
    let parts: Vec<String> = embedding.values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

fn read_records(path: &Path, dimension: usize) -> Result<Vec<FaceRecord>, StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let load_err = |row: usize, reason: String| StoreError::Load {
        path: path.to_path_buf(),
        row,
        reason,
    };

    let mut records = Vec::new();
    for (i, result) in reader.deserialize::<Row>().enumerate() {
        let row_num = i + 1;
        let row = result.map_err(|e| load_err(row_num, e.to_string()))?;

        let label = row.label.trim();
        if label.is_empty() {
            return Err(load_err(row_num, "empty label".to_string()));
        }
        let embedding =
            parse_encoding(&row.face_encoding, dimension).map_err(|reason| load_err(row_num, reason))?;
        let enrolled_at = NaiveDateTime::parse_from_str(row.timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| load_err(row_num, format!("bad timestamp {:?}: {e}", row.timestamp)))?;

        records.push(FaceRecord {
            label: label.to_string(),
            embedding,
            enrolled_at,
        });
    }
    Ok(records)
}

fn write_records<'a>(
    path: &Path,
    records: impl Iterator<Item = &'a FaceRecord>,
) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> io::Result<()> {
        let file = fs::File::create(&tmp_path)?;
        let mut writer = csv::Writer::from_writer(file);
        for record in records {
            writer.serialize(Row {
                label: record.label.clone(),
                face_encoding: format_encoding(&record.embedding),
                timestamp: record.enrolled_at.format(TIMESTAMP_FORMAT).to_string(),
            })?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
