//! CSV to Parquet conversion held entirely in memory.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::parser::parse_csv;

pub const FORMAT_NAME: &str = "parquet";
pub const CODEC_NAME: &str = "snappy";

const PREVIEW_ROWS: usize = 3;

/// The serialized dataset, produced once and handed to the publisher.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Bytes,
    pub records: usize,
    pub columns: Vec<String>,
    pub schema: SchemaRef,
    /// Size of the delimited input the artifact was built from.
    pub raw_size: usize,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// `(1 - compressed / raw) * 100`; zero when there was no input.
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.raw_size, self.size())
    }
}

pub fn compression_ratio(raw_size: usize, compressed_size: usize) -> f64 {
    if raw_size == 0 {
        return 0.0;
    }
    (1.0 - compressed_size as f64 / raw_size as f64) * 100.0
}

/// Parses the delimited input, infers column types and writes a
/// Snappy-compressed Parquet buffer.
#[instrument(skip(data), fields(raw_size = data.len()))]
pub fn convert(data: &[u8]) -> Result<Artifact> {
    let batch = parse_csv(data)?;
    let columns: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    info!(records = batch.num_rows(), "CSV loaded");
    info!(columns = %columns.join(", "), "Columns");
    log_preview(&batch);

    let bytes = write_parquet(&batch)?;
    let artifact = Artifact {
        bytes,
        records: batch.num_rows(),
        columns,
        schema: batch.schema(),
        raw_size: data.len(),
    };

    info!(
        csv_kb = %format!("{:.2}", kb(artifact.raw_size)),
        parquet_kb = %format!("{:.2}", kb(artifact.size())),
        compression = %format!("{:.1}%", artifact.compression_ratio()),
        "Conversion completed"
    );
    Ok(artifact)
}

/// Writes one batch as a single Parquet file; no index column is added.
pub fn write_parquet(batch: &RecordBatch) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(concat!("parquet-etl ", env!("CARGO_PKG_VERSION")).to_string())
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    Ok(Bytes::from(buffer))
}

fn log_preview(batch: &RecordBatch) {
    let head = batch.slice(0, batch.num_rows().min(PREVIEW_ROWS));
    match pretty_format_batches(&[head]) {
        Ok(table) => info!("First {} rows:\n{}", PREVIEW_ROWS, table),
        Err(e) => warn!(error = %e, "Could not render preview"),
    }
}

pub(crate) fn kb(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}
