//! Bulk-format archives
//!
//! A campaign structure travels as a zip archive with one CSV file per entity kind
//! (`SDF-Campaigns.csv`, `SDF-InsertionOrders.csv`, ...). Every value is quoted on export; columns
//! are the table's own columns followed by any extra fields rows picked up during generation.

use super::{EntityKind, SdfStructure, SdfTable};
use crate::error::ApiError;
use crate::rowset::{value_text, Row, RowSet};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde_json::Value;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Write a structure as a zip archive to `path`.
pub fn write_archive(structure: &SdfStructure, path: &Path) -> Result<(), ApiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_zip(structure, file)?;
    info!(path = %path.display(), "Exported campaign structure");
    Ok(())
}

/// Zip archive bytes for a structure.
pub fn write_archive_bytes(structure: &SdfStructure) -> Result<Vec<u8>, ApiError> {
    let mut buffer = Cursor::new(Vec::new());
    write_zip(structure, &mut buffer)?;
    Ok(buffer.into_inner())
}

fn write_zip<W: Write + Seek>(structure: &SdfStructure, writer: W) -> Result<(), ApiError> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for table in structure.tables() {
        let content = table_csv(table)?;
        zip.start_file(table.kind().file_name(), options)?;
        zip.write_all(&content)?;
        debug!(
            entity = %table.kind(),
            rows = table.len(),
            "Wrote entity file"
        );
    }
    zip.finish()?;
    Ok(())
}

fn table_csv(table: &SdfTable) -> Result<Vec<u8>, ApiError> {
    let rows = table.export_rows();
    let columns = rows.all_fields();
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in rows.iter() {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(column).map(value_text).unwrap_or_default()),
        )?;
    }
    writer
        .into_inner()
        .map_err(|e| ApiError::ArchiveError(format!("Failed to flush CSV: {}", e)))
}

/// Read a structure from a zip archive on disk.
pub fn read_archive(path: &Path, advertiser_id: &str) -> Result<SdfStructure, ApiError> {
    let file = File::open(path).map_err(|e| {
        ApiError::ArchiveError(format!("Cannot open archive {}: {}", path.display(), e))
    })?;
    read_zip(file, advertiser_id)
}

/// Read a structure from zip archive bytes.
pub fn read_archive_bytes(bytes: &[u8], advertiser_id: &str) -> Result<SdfStructure, ApiError> {
    read_zip(Cursor::new(bytes), advertiser_id)
}

fn read_zip<R: Read + Seek>(reader: R, advertiser_id: &str) -> Result<SdfStructure, ApiError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut structure = SdfStructure::new(advertiser_id);
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(kind) = entity_kind_of(&name) else {
            debug!(entry = %name, "Skipping unrecognized archive entry");
            continue;
        };
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        match parse_table_csv(&content)? {
            Some(rows) => structure.insert(SdfTable::from_rowset(kind, rows)),
            None => debug!(entity = %kind, "Entity file has no rows"),
        }
    }
    Ok(structure)
}

/// `.../SDF-<stem>.csv` to its entity kind.
fn entity_kind_of(entry_name: &str) -> Option<EntityKind> {
    let file_name = entry_name.rsplit('/').next().unwrap_or(entry_name);
    let rest = file_name.strip_prefix("SDF-")?;
    let stem = rest.split('.').next().unwrap_or(rest);
    EntityKind::from_file_stem(stem)
}

/// Rows of an entity file, all values kept as text. `None` when the file has no data rows.
fn parse_table_csv(content: &[u8]) -> Result<Option<RowSet>, ApiError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(content);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                (
                    header.clone(),
                    Value::String(record.get(i).unwrap_or_default().to_string()),
                )
            })
            .collect();
        rows.push(row);
    }
    if rows.is_empty() {
        return Ok(None);
    }
    RowSet::from_rows(rows).map(Some)
}
