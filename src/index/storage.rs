//! Binary storage for the document index.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id: u64 (little-endian)
//! - name_len: u32, name bytes (UTF-8)
//! - description_len: u32, description bytes (UTF-8)
//! - chunk_count: u16
//! - chunks: chunk_count * [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::index::vector::{DocumentEntry, DocumentIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for the indexed document collection.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the document index from storage.
    ///
    /// Fails if the file was written by a different model, a newer format
    /// version, or has been corrupted.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<DocumentIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_model_id, expected_dimensions)?;

        let mut index =
            DocumentIndex::with_capacity(header.dimensions as usize, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (id, name, description, chunks) =
                read_entry(&mut reader, header.dimensions as usize)?;
            // Skip entries the index rejects (e.g. zero norm) instead of
            // failing the whole load
            let _ = index.upsert(id, name, description, chunks);
        }

        Ok(index)
    }

    /// Save the document index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &DocumentIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        index: &DocumentIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions: index.dimensions() as u16,
            entry_count: index.len() as u64,
        };
        write_header(&mut writer, &header)?;

        for (id, entry) in index.iter() {
            write_entry(&mut writer, id, entry)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);
    let entry_count = u64::from_le_bytes(count_bytes);

    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&header_bytes[43..47]);
    let stored_checksum = u32::from_le_bytes(checksum_bytes);

    // Checksum covers the header without the checksum field
    let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
    if stored_checksum != computed_checksum {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id,
        dimensions,
        entry_count,
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn write_header(writer: &mut BufWriter<File>, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(u64, String, String, Vec<Vec<f32>>), VectorStorageError> {
    let mut id_bytes = [0u8; 8];
    reader.read_exact(&mut id_bytes)?;
    let id = u64::from_le_bytes(id_bytes);

    let name = read_string(reader)?;
    let description = read_string(reader)?;

    let mut count_bytes = [0u8; 2];
    reader.read_exact(&mut count_bytes)?;
    let chunk_count = u16::from_le_bytes(count_bytes);

    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }
        chunks.push(embedding);
    }

    Ok((id, name, description, chunks))
}

fn read_string(reader: &mut BufReader<File>) -> Result<String, VectorStorageError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;

    String::from_utf8(bytes)
        .map_err(|e| VectorStorageError::InvalidFormat(format!("invalid utf-8 string: {}", e)))
}

fn write_entry(
    writer: &mut BufWriter<File>,
    id: u64,
    entry: &DocumentEntry,
) -> Result<(), VectorStorageError> {
    writer.write_all(&id.to_le_bytes())?;

    write_string(writer, &entry.name)?;
    write_string(writer, &entry.description)?;

    writer.write_all(&(entry.chunks.len() as u16).to_le_bytes())?;
    for chunk in &entry.chunks {
        for &value in chunk {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    Ok(())
}

fn write_string(writer: &mut BufWriter<File>, s: &str) -> Result<(), VectorStorageError> {
    writer.write_all(&(s.len() as u32).to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}
