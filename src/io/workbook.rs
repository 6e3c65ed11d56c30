//! `.erbook` workbooks.
//!
//! A workbook is a zip archive with a `workspace_schema.json` manifest and
//! one Parquet snapshot per table, named `<sheet-id>_<dfi>.ersnap`. The
//! manifest is deflated; snapshots are stored as they are, without Parquet
//! compression or statistics, so saving a large workspace stays fast.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read as _, Write as _};
use std::path::Path;
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{EruoError, Result, ResultExt as _};
use crate::sheet::{BoundingBox, Filter, SheetData, SheetDocument, SheetView, SortKey};
use crate::workspace::Workspace;

pub const SCHEMA_ENTRY: &str = "workspace_schema.json";
pub const SNAPSHOT_EXTENSION: &str = "ersnap";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceSchema {
    /// Path the workbook was saved to
    pub signature: String,
    pub sheets: Vec<SheetSchema>,
    #[serde(default)]
    pub current_active_tab: usize,
    #[serde(default)]
    pub pinned_tabs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SheetSchema {
    pub id: String,
    pub title: String,
    pub data: SheetDataSchema,
    #[serde(default)]
    pub display: DisplaySchema,
    #[serde(default)]
    pub current_sorts: Vec<SortKey>,
    #[serde(default)]
    pub current_filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SheetDataSchema {
    pub bounding_boxes: Vec<BoundingBox>,
    pub dataframe_paths: Vec<String>,
    pub has_main_dataframe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DisplaySchema {
    #[serde(default)]
    pub row_visibility_flags: Vec<bool>,
    #[serde(default)]
    pub column_visibility_flags: Vec<bool>,
}

fn snapshot_name(id: &str, dfi: usize) -> String {
    format!("{id}_{dfi}.{SNAPSHOT_EXTENSION}")
}

/// Saves every sheet of `workspace` to `path`.
pub fn write_workbook(workspace: &Workspace, path: &Path) -> Result<()> {
    let mut schema = WorkspaceSchema {
        signature: path.display().to_string(),
        sheets: Vec::with_capacity(workspace.len()),
        current_active_tab: workspace.active_tab,
        pinned_tabs: workspace.pinned_tabs.clone(),
    };

    let file = File::create(path).with_context(|| format!("Cannot write file: {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for document in workspace.sheets() {
        let data = document.data();
        let mut paths = Vec::with_capacity(data.len());
        for (dfi, frame) in data.frames().iter().enumerate() {
            let name = snapshot_name(document.id(), dfi);
            let bytes = snapshot_bytes(frame)
                .with_context(|| format!("Failed to snapshot sheet {}", document.title()))?;
            zip.start_file(name.as_str(), stored)?;
            zip.write_all(&bytes)?;
            paths.push(name);
        }

        let view = document.view();
        schema.sheets.push(SheetSchema {
            id: document.id().to_owned(),
            title: document.title().to_owned(),
            data: SheetDataSchema {
                bounding_boxes: data.boxes().to_vec(),
                dataframe_paths: paths,
                has_main_dataframe: data.has_main(),
            },
            display: DisplaySchema {
                row_visibility_flags: view.row_visibility.clone(),
                column_visibility_flags: view.column_visibility.clone(),
            },
            current_sorts: view.current_sorts.clone(),
            current_filters: view.current_filters.clone(),
        });
    }

    let manifest = serde_json::to_string_pretty(&schema).context("Failed to serialize workbook")?;
    zip.start_file(
        SCHEMA_ENTRY,
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    zip.write_all(manifest.as_bytes())?;
    zip.finish()?;

    tracing::info!("Saved {} sheets to {}", workspace.len(), path.display());
    Ok(())
}

fn snapshot_bytes(frame: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut frame = frame.clone();
    ParquetWriter::new(&mut buffer)
        .with_compression(ParquetCompression::Uncompressed)
        .with_statistics(StatisticsOptions::empty())
        .finish(&mut frame)?;
    Ok(buffer.into_inner())
}

/// Reads the manifest of a workbook without loading any table.
pub fn read_workbook_schema(path: &Path) -> Result<WorkspaceSchema> {
    let mut archive = open_archive(path)?;
    read_schema(&mut archive)
}

/// Opens a workbook and rebuilds its sheets. History is not saved, so every
/// sheet starts with an empty one.
pub fn read_workbook(path: &Path) -> Result<Workspace> {
    let mut archive = open_archive(path)?;
    let schema = read_schema(&mut archive)?;

    let mut workspace = Workspace::new();
    for sheet in schema.sheets {
        if sheet.data.dataframe_paths.len() != sheet.data.bounding_boxes.len() {
            return Err(EruoError::DataProcessing(format!(
                "Sheet {} has {} tables but {} bounding boxes",
                sheet.title,
                sheet.data.dataframe_paths.len(),
                sheet.data.bounding_boxes.len()
            )));
        }
        let mut frames = Vec::with_capacity(sheet.data.dataframe_paths.len());
        for name in &sheet.data.dataframe_paths {
            let mut bytes = Vec::new();
            archive
                .by_name(name)
                .with_context(|| format!("Missing snapshot {name}"))?
                .read_to_end(&mut bytes)?;
            let frame = ParquetReader::new(Cursor::new(bytes))
                .finish()
                .with_context(|| format!("Cannot read snapshot {name}"))?;
            frames.push(frame);
        }

        let mut data = SheetData::default();
        data.restore(frames, sheet.data.bounding_boxes, sheet.data.has_main_dataframe);
        let view = SheetView {
            row_visibility: sheet.display.row_visibility_flags,
            column_visibility: sheet.display.column_visibility_flags,
            current_filters: sheet.current_filters,
            current_sorts: sheet.current_sorts,
        };
        workspace.add_sheet(SheetDocument::from_parts(sheet.id, sheet.title, data, view));
    }

    workspace.active_tab = schema.current_active_tab.min(workspace.len().saturating_sub(1));
    workspace.pinned_tabs = schema
        .pinned_tabs
        .into_iter()
        .filter(|&tab| tab < workspace.len())
        .collect();
    tracing::info!("Opened {} sheets from {}", workspace.len(), path.display());
    Ok(workspace)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Cannot read file: {}", path.display()))?;
    ZipArchive::new(file)
        .map_err(|_| EruoError::InvalidPath(format!("not a workbook: {}", path.display())))
}

fn read_schema(archive: &mut ZipArchive<File>) -> Result<WorkspaceSchema> {
    let mut manifest = String::new();
    archive
        .by_name(SCHEMA_ENTRY)
        .context("Workbook has no workspace schema")?
        .read_to_string(&mut manifest)?;
    serde_json::from_str(&manifest).context("Invalid workspace schema")
}
