//! Reading and writing tables and workbooks.
//!
//! Plain files hold a single table: CSV, JSON or Parquet, chosen by
//! extension. Workbooks (`.erbook`) hold every sheet of a workspace, see
//! [`workbook`].

pub mod workbook;

use anyhow::{Context as _, Result, anyhow, bail};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::EruoError;

pub use workbook::{read_workbook, write_workbook};

/// Suffix appended to a file that is about to be overwritten.
pub const BACKUP_SUFFIX: &str = ".erbak";

/// Separator used by the last CSV fallback. It never appears in ordinary
/// text, so every line lands in one column.
const LINE_SEPARATOR: u8 = 0x1f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
    Workbook,
}

impl FileFormat {
    /// Format named by the file extension, case-insensitive.
    pub fn from_path(path: &Path) -> crate::error::Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            "erbook" => Ok(Self::Workbook),
            _ => Err(EruoError::Unsupported(format!("file format: {ext}"))),
        }
    }
}

/// Reads a CSV, JSON or Parquet file, falling back to looser CSV parsing.
pub fn read_file(path: &Path) -> Result<DataFrame> {
    read_file_with(path, true)
}

/// Reads a table file. With `csv_fallback`, a CSV that fails to parse is read
/// again with every column as text, then once more with each line as a
/// single text cell.
pub fn read_file_with(path: &Path, csv_fallback: bool) -> Result<DataFrame> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => read_csv(path, csv_fallback),
        FileFormat::Json => JsonReader::new(File::open(path)?)
            .finish()
            .with_context(|| format!("Cannot read file: {}", path.display())),
        FileFormat::Parquet => ParquetReader::new(File::open(path)?)
            .finish()
            .with_context(|| format!("Cannot read file: {}", path.display())),
        FileFormat::Workbook => bail!("Workbooks hold several sheets, use read_workbook"),
    }
}

fn read_csv(path: &Path, csv_fallback: bool) -> Result<DataFrame> {
    let strict = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000));
    let first = read_csv_with(path, strict);
    if first.is_ok() || !csv_fallback {
        return first.with_context(|| format!("Cannot read file: {}", path.display()));
    }
    if let Err(err) = &first {
        tracing::warn!("Reading {} as plain text columns: {err}", path.display());
    }

    let as_text = CsvReadOptions::default()
        .with_has_header(true)
        .with_ignore_errors(true)
        .with_infer_schema_length(Some(0));
    match read_csv_with(path, as_text.clone()) {
        Ok(df) => return Ok(df),
        Err(err) => tracing::warn!("Reading {} one line per row: {err}", path.display()),
    }

    let lines = as_text.map_parse_options(|options| {
        options
            .with_separator(LINE_SEPARATOR)
            .with_quote_char(None)
            .with_truncate_ragged_lines(true)
    });
    read_csv_with(path, lines).with_context(|| format!("Cannot parse file: {}", path.display()))
}

fn read_csv_with(path: &Path, options: CsvReadOptions) -> PolarsResult<DataFrame> {
    options
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

/// Scans a table file lazily, for pipelines.
pub fn scan_file(path: &Path) -> Result<LazyFrame> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10_000))
            .with_has_header(true)
            .finish()
            .context("Failed to scan CSV"),
        FileFormat::Parquet => {
            LazyFrame::scan_parquet(path, ScanArgsParquet::default()).context("Failed to scan Parquet")
        }
        // Polars has no lazy JSON reader, so the file is read eagerly.
        FileFormat::Json => Ok(read_file(path)?.lazy()),
        FileFormat::Workbook => bail!("Workbooks hold several sheets, use read_workbook"),
    }
}

/// Writes `frame`, keeping any previous file as `<path>.erbak`.
pub fn write_file(frame: &mut DataFrame, path: &Path) -> Result<()> {
    write_file_with(frame, path, true)
}

/// Writes `frame` as CSV, JSON or Parquet.
///
/// An existing file is renamed to `<path>.erbak` first and put back when
/// writing fails. With `keep_backup` off, the backup is removed after a
/// successful write.
pub fn write_file_with(frame: &mut DataFrame, path: &Path, keep_backup: bool) -> Result<()> {
    let format = FileFormat::from_path(path)?;
    if format == FileFormat::Workbook {
        bail!("Workbooks hold several sheets, use write_workbook");
    }

    let backup = backup_path(path);
    let has_backup = path.exists();
    if has_backup {
        std::fs::rename(path, &backup)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
    }

    match write_frame(frame, path, format) {
        Ok(()) => {
            if has_backup && !keep_backup {
                delete_file(&backup);
            }
            tracing::info!("Wrote {} rows to {}", frame.height(), path.display());
            Ok(())
        }
        Err(err) => {
            if has_backup {
                std::fs::rename(&backup, path).map_err(|restore| {
                    anyhow!("{err:#}; restoring the backup also failed: {restore}")
                })?;
            }
            Err(err.context(format!("Cannot write file: {}", path.display())))
        }
    }
}

fn write_frame(frame: &mut DataFrame, path: &Path, format: FileFormat) -> Result<()> {
    let file = File::create(path).context("Failed to create output file")?;
    match format {
        FileFormat::Csv => CsvWriter::new(file)
            .include_header(true)
            .finish(frame)
            .context("Failed to write CSV file")?,
        FileFormat::Json => JsonWriter::new(file)
            .with_json_format(JsonFormat::Json)
            .finish(frame)
            .context("Failed to write JSON file")?,
        FileFormat::Parquet => ParquetWriter::new(file)
            .finish(frame)
            .map(|_| ())
            .context("Failed to write Parquet file")?,
        FileFormat::Workbook => bail!("Workbooks hold several sheets, use write_workbook"),
    }
    Ok(())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Removes a file. Failure is logged, not raised.
pub fn delete_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("Cannot delete file {}: {err}", path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unsupported_extension() {
        let err = read_file(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file format: txt");
        assert!(matches!(
            err.downcast_ref::<EruoError>(),
            Some(EruoError::Unsupported(_))
        ));
    }

    #[test]
    fn test_write_and_read_each_format() {
        let dir = TempDir::new().unwrap();
        let mut df = df!("name" => ["a", "b"], "qty" => [1i64, 2]).unwrap();
        for ext in ["csv", "json", "parquet"] {
            let path = dir.path().join(format!("data.{ext}"));
            write_file(&mut df, &path).unwrap();
            let back = read_file(&path).unwrap();
            assert_eq!(back.shape(), (2, 2), "{ext}");
            assert_eq!(back.get_column_names_str(), ["name", "qty"], "{ext}");
        }
    }

    #[test]
    fn test_overwrite_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "old\n1\n").unwrap();

        let mut df = df!("new" => [2i64]).unwrap();
        write_file(&mut df, &path).unwrap();

        let backup = backup_path(&path);
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "old\n1\n");
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("new"));

        write_file_with(&mut df, &path, false).unwrap();
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_ragged_csv_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.csv");
        // Extra fields fail the typed and the all-text read alike
        std::fs::write(&path, "a,b\n1,2\n3,4,5,6\n").unwrap();

        let df = read_file(&path).unwrap();
        assert_eq!(df.shape(), (2, 1));
        assert_eq!(df.get_column_names_str(), ["a,b"]);
        let lines: Vec<Option<&str>> = df.column("a,b").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(lines, [Some("1,2"), Some("3,4,5,6")]);
        assert!(read_file_with(&path, false).is_err());
    }

    #[test]
    fn test_delete_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.csv");
        std::fs::write(&path, "a\n").unwrap();
        assert!(delete_file(&path));
        assert!(!delete_file(&path));
    }
}
