//! Pipeline specification data structures.
//!
//! Defines the JSON schema for pipeline specs, including input/output configuration,
//! transformation steps, and schema matching rules.

use crate::config::ListSeparator;
use crate::history::{HistoryManager, PipelineEffect};
use crate::sheet::SortKey;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Current pipeline spec version
pub const SPEC_VERSION: &str = "0.1";

/// Root pipeline specification structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Specification version for future migrations
    pub version: String,

    /// Human-readable pipeline name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Argument separator of the formulas in `measure` and `filter_rows` steps
    #[serde(default)]
    pub list_separator: ListSeparator,

    /// Input file configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Schema validation rules
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Ordered sequence of transformation steps
    pub steps: Vec<Step>,

    /// Output file configuration
    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineSpec {
    /// Create a new pipeline spec with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: SPEC_VERSION.to_owned(),
            name: name.into(),
            description: None,
            list_separator: ListSeparator::default(),
            input: InputConfig::default(),
            schema: SchemaConfig::default(),
            steps: Vec::new(),
            output: OutputConfig::default(),
        }
    }

    /// Load a pipeline spec from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read pipeline spec file")?;
        Self::from_json(&content)
    }

    /// Parse a pipeline spec from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse pipeline spec JSON")
    }

    /// Save pipeline spec to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json).context("Failed to write pipeline spec file")
    }

    /// Serialize pipeline spec to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize pipeline spec")
    }

    /// Replays the recorded history of a document as pipeline steps.
    ///
    /// Presentation-only changes have no step and are skipped. Resetting the
    /// filters drops the filter steps recorded before it.
    pub fn from_history(
        name: impl Into<String>,
        history: &HistoryManager,
        separator: ListSeparator,
    ) -> Self {
        let mut spec = Self::new(name);
        spec.list_separator = separator;

        for state in history.states() {
            match &state.effect {
                PipelineEffect::Step(step) => spec.steps.push(step.clone()),
                PipelineEffect::ClearFilters => spec
                    .steps
                    .retain(|step| !matches!(step, Step::FilterRows { .. })),
                PipelineEffect::None => {}
            }
        }
        spec.description = Some(format!("Recorded from {} sheet changes", history.len()));
        spec
    }
}

/// Input file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// File format (csv, json, parquet)
    #[serde(default = "default_format")]
    pub format: String,

    /// Whether the file has a header row
    #[serde(default = "default_true")]
    pub has_header: bool,

    /// CSV delimiter character
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// File encoding
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            has_header: default_true(),
            delimiter: default_delimiter(),
            encoding: default_encoding(),
        }
    }
}

/// Schema validation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Schema matching mode
    #[serde(default)]
    pub match_mode: SchemaMatchMode,

    /// Required column names
    #[serde(default)]
    pub required_columns: Vec<String>,
}

/// Schema matching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMatchMode {
    /// Required columns must exist, allow extra columns
    #[default]
    Tolerant,

    /// Exact match: required columns only, no extras
    Strict,
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format (csv, json, parquet)
    #[serde(default = "default_parquet_format")]
    pub format: String,

    /// Output path template (supports {date} substitution)
    #[serde(default)]
    pub path_template: String,

    /// Whether to overwrite existing files
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_parquet_format(),
            path_template: String::new(),
            overwrite: default_true(),
        }
    }
}

/// Transformation step (tagged enum)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Drop specified columns
    DropColumns { columns: Vec<String> },

    /// Rename columns according to mapping
    RenameColumns { mapping: HashMap<String, String> },

    /// Listed columns first, the rest keep their order
    ReorderColumns { columns: Vec<String> },

    /// Cast columns to target data types
    CastTypes {
        /// Map of column name to dtype name (e.g., "i64", "text", "date.")
        columns: HashMap<String, String>,
    },

    /// Apply a text operator such as `uppercase` or `split-by-characters`
    TextTransform {
        columns: Vec<String>,
        operator: String,
        #[serde(default)]
        args: Vec<String>,
    },

    /// Add or replace a column from a `Name = formula` measure
    Measure { expression: String },

    /// Keep rows where a boolean formula holds
    FilterRows { formula: String },

    /// Sort rows, nulls last
    SortRows { by: Vec<SortKey> },

    /// Search and replace text in string columns
    FindReplace {
        /// All string columns when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        search: String,
        replace: String,
        #[serde(default)]
        match_case: bool,
        #[serde(default)]
        match_cell: bool,
        #[serde(default)]
        use_regexp: bool,
    },

    /// Fill missing values
    FillNull {
        columns: Vec<String>,
        strategy: FillStrategy,
        /// Used by the `value` strategy
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },

    /// Drop duplicate rows, comparing only `columns` when given
    Deduplicate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },

    /// Run SQL with the current frame registered as `self`
    Sql { query: String },
}

impl Step {
    /// The `op` tag of the step.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DropColumns { .. } => "drop_columns",
            Self::RenameColumns { .. } => "rename_columns",
            Self::ReorderColumns { .. } => "reorder_columns",
            Self::CastTypes { .. } => "cast_types",
            Self::TextTransform { .. } => "text_transform",
            Self::Measure { .. } => "measure",
            Self::FilterRows { .. } => "filter_rows",
            Self::SortRows { .. } => "sort_rows",
            Self::FindReplace { .. } => "find_replace",
            Self::FillNull { .. } => "fill_null",
            Self::Deduplicate { .. } => "deduplicate",
            Self::Sql { .. } => "sql",
        }
    }
}

/// Strategy for missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    Mean,
    Median,
    Mode,
    Zero,
    Value,
}

// Default value functions
fn default_format() -> String {
    "csv".to_owned()
}

fn default_parquet_format() -> String {
    "parquet".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_owned()
}

fn default_encoding() -> String {
    "utf-8".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_serialization() {
        let mut spec = PipelineSpec::new("test_pipeline");
        spec.steps.push(Step::DropColumns {
            columns: vec!["col1".to_owned(), "col2".to_owned()],
        });
        spec.steps.push(Step::TextTransform {
            columns: vec!["name".to_owned()],
            operator: "trim-whitespaces".to_owned(),
            args: Vec::new(),
        });

        let json = spec.to_json().expect("Failed to serialize");
        assert!(json.contains("\"version\": \"0.1\""));
        assert!(json.contains("\"op\": \"drop_columns\""));
        assert!(json.contains("\"op\": \"text_transform\""));

        let parsed = PipelineSpec::from_json(&json).expect("Failed to parse");
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "version": "0.1",
            "name": "minimal",
            "steps": [
                {"op": "sort_rows", "by": [{"column": "qty", "descending": true}]},
                {"op": "fill_null", "columns": ["qty"], "strategy": "zero"},
                {"op": "deduplicate"}
            ]
        }"#;
        let spec = PipelineSpec::from_json(json).expect("Failed to parse");

        assert_eq!(spec.input.format, "csv");
        assert_eq!(spec.output.format, "parquet");
        assert_eq!(spec.list_separator, ListSeparator::Comma);
        assert_eq!(
            spec.steps.first(),
            Some(&Step::SortRows {
                by: vec![SortKey::new("qty", true)]
            })
        );
        assert_eq!(spec.steps.get(2), Some(&Step::Deduplicate { columns: None }));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let json = r#"{"version": "0.1", "name": "x", "steps": [{"op": "explode"}]}"#;
        assert!(PipelineSpec::from_json(json).is_err());
    }

    #[test]
    fn test_step_names_match_tags() {
        let step = Step::FindReplace {
            columns: None,
            search: "a".to_owned(),
            replace: "b".to_owned(),
            match_case: false,
            match_cell: false,
            use_regexp: false,
        };
        let json = serde_json::to_string(&step).expect("Failed to serialize");
        assert!(json.contains(&format!("\"op\":\"{}\"", step.name())));
    }
}
