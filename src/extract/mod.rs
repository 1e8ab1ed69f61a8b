//! Chunked CSV extraction and consolidation
//!
//! [`extract_csv`] opens a source lazily and yields [`Frame`]s of at most
//! `chunk_size` rows; [`concat_chunks`] re-materializes them into a single
//! frame for the transformation stages.
//!
//! ```rust,ignore
//! use shop_etl::extract::{concat_chunks, extract_csv};
//!
//! let chunks = extract_csv("ecommerce_data/sample_orders.csv", 10_000)?;
//! let orders = concat_chunks(chunks)?;
//! ```

mod error;

pub use error::{ExtractError, ExtractResult};

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::frame::{Cell, Frame};

/// Default number of rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Cell values read as null
const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "NULL", "null", "None"];

fn to_cell(raw: &str) -> Cell {
    if NULL_MARKERS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Lazy sequence of row chunks read from one CSV file
pub struct CsvChunks {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    chunk_size: usize,
    record: csv::StringRecord,
    chunks_read: usize,
    done: bool,
}

impl CsvChunks {
    /// Header of the source file
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Source path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_chunk(&mut self) -> ExtractResult<Option<Frame>> {
        let mut frame = Frame::new(self.headers.clone());
        while frame.len() < self.chunk_size {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| ExtractError::from_csv(&self.path, e))?;
            if !more {
                self.done = true;
                break;
            }
            let line = self.record.position().map_or(0, |p| p.line());
            frame
                .push_row(self.record.iter().map(to_cell).collect())
                .map_err(|e| ExtractError::Malformed {
                    path: self.path.clone(),
                    line,
                    message: e.to_string(),
                })?;
        }

        if frame.is_empty() {
            return Ok(None);
        }

        self.chunks_read += 1;
        debug!(
            path = %self.path.display(),
            chunk = self.chunks_read,
            rows = frame.len(),
            "Read chunk"
        );
        Ok(Some(frame))
    }
}

impl Iterator for CsvChunks {
    type Item = ExtractResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a CSV source for chunked reading
///
/// The header is read eagerly so a missing or unreadable file fails here
/// rather than on the first chunk.
pub fn extract_csv(path: impl AsRef<Path>, chunk_size: usize) -> ExtractResult<CsvChunks> {
    let path = path.as_ref();
    if chunk_size == 0 {
        return Err(ExtractError::InvalidChunkSize(chunk_size));
    }
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| ExtractError::from_csv(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    debug!(path = %path.display(), chunk_size, "Opened CSV source");

    Ok(CsvChunks {
        path: path.to_path_buf(),
        reader,
        headers,
        chunk_size,
        record: csv::StringRecord::new(),
        chunks_read: 0,
        done: false,
    })
}

/// Concatenate chunks back into one frame, in order
///
/// An empty sequence yields an empty frame with no columns.
pub fn concat_chunks<I>(chunks: I) -> ExtractResult<Frame>
where
    I: IntoIterator<Item = ExtractResult<Frame>>,
{
    let mut combined: Option<Frame> = None;
    for chunk in chunks {
        let chunk = chunk?;
        match combined.as_mut() {
            None => combined = Some(chunk),
            Some(frame) => {
                if frame.columns() != chunk.columns() {
                    return Err(ExtractError::HeaderMismatch {
                        expected: frame.columns().to_vec(),
                        found: chunk.columns().to_vec(),
                    });
                }
                frame.extend(chunk);
            }
        }
    }
    Ok(combined.unwrap_or_default())
}

/// Extract and consolidate a whole file
///
/// A header-only file yields an empty frame that still carries the header.
pub fn read_table(path: impl AsRef<Path>, chunk_size: usize) -> ExtractResult<Frame> {
    let chunks = extract_csv(path, chunk_size)?;
    let headers = chunks.headers().to_vec();
    let frame = concat_chunks(chunks)?;
    if frame.columns().is_empty() {
        Ok(Frame::new(headers))
    } else {
        Ok(frame)
    }
}
