//! Pipeline specification validation.
//!
//! Validates pipeline specs against input data schemas before execution,
//! catching errors early with actionable error messages.

use super::spec::{FillStrategy, PipelineSpec, SchemaMatchMode, Step};
use crate::formula::{Formula, Node, Operation};
use crate::operators;
use crate::sheet::parse_dtype;
use anyhow::Result;
use polars::prelude::*;
use std::collections::HashSet;

/// Validation error with helpful context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub step_index: Option<usize>,
    pub message: String,
}

impl ValidationError {
    fn new(step_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            step_index,
            message: message.into(),
        }
    }

    fn step(step_index: usize, message: impl Into<String>) -> Self {
        Self::new(Some(step_index), message)
    }

    fn schema(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(idx) = self.step_index {
            write!(f, "Step {}: {}", idx + 1, self.message)
        } else {
            write!(f, "Schema: {}", self.message)
        }
    }
}

/// Columns available at a point of the pipeline. A `sql` step may reshape the
/// frame arbitrarily, after which column checks stop.
struct ColumnFlow {
    columns: HashSet<String>,
    known: bool,
}

impl ColumnFlow {
    fn has(&self, column: &str) -> bool {
        !self.known || self.columns.contains(column)
    }
}

/// Validate a pipeline spec against an input schema
pub fn validate_pipeline(
    spec: &PipelineSpec,
    input_schema: &Schema,
) -> Result<Vec<ValidationError>> {
    let mut errors = Vec::new();

    if spec.version != super::spec::SPEC_VERSION {
        errors.push(ValidationError::schema(format!(
            "Unsupported spec version '{}', expected '{}'",
            spec.version,
            super::spec::SPEC_VERSION
        )));
    }

    validate_schema_requirements(spec, input_schema, &mut errors);

    // Simulate step-by-step execution to track schema changes
    let mut flow = ColumnFlow {
        columns: input_schema
            .iter_names()
            .map(|s| s.as_str().to_owned())
            .collect(),
        known: true,
    };

    let separator = spec.list_separator.as_char();
    for (idx, step) in spec.steps.iter().enumerate() {
        validate_step(step, idx, separator, &mut flow, &mut errors);
    }

    Ok(errors)
}

/// Validate schema matching requirements
fn validate_schema_requirements(
    spec: &PipelineSpec,
    input_schema: &Schema,
    errors: &mut Vec<ValidationError>,
) {
    let input_cols: HashSet<String> = input_schema
        .iter_names()
        .map(|s| s.as_str().to_owned())
        .collect();

    for required in &spec.schema.required_columns {
        if !input_cols.contains(required) {
            errors.push(ValidationError::schema(format!(
                "Required column '{required}' not found in input"
            )));
        }
    }

    // Strict mode: no extra columns allowed
    if matches!(spec.schema.match_mode, SchemaMatchMode::Strict) {
        let required_set: HashSet<_> = spec.schema.required_columns.iter().cloned().collect();
        let mut extra_cols: Vec<_> = input_cols.difference(&required_set).collect();
        extra_cols.sort();

        if !extra_cols.is_empty() {
            errors.push(ValidationError::schema(format!(
                "Strict mode: unexpected columns found: {extra_cols:?}"
            )));
        }
    }
}

/// Validate a single step and update column tracking
fn validate_step(
    step: &Step,
    idx: usize,
    separator: char,
    flow: &mut ColumnFlow,
    errors: &mut Vec<ValidationError>,
) {
    match step {
        Step::DropColumns { columns: drop_cols } => {
            for col in drop_cols {
                if !flow.has(col) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot drop non-existent column '{col}'"),
                    ));
                } else {
                    flow.columns.remove(col);
                }
            }
        }

        Step::RenameColumns { mapping } => {
            let mut pairs: Vec<_> = mapping.iter().collect();
            pairs.sort();
            for (from, to) in pairs {
                if !flow.has(from) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename non-existent column '{from}'"),
                    ));
                } else if flow.known && flow.columns.contains(to) && from != to {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename '{from}' to '{to}': target already exists"),
                    ));
                } else {
                    flow.columns.remove(from);
                    flow.columns.insert(to.clone());
                }
            }
        }

        Step::ReorderColumns { columns } => {
            validate_columns_exist(columns, flow, idx, "reorder", errors);
        }

        Step::CastTypes { columns: cast_cols } => {
            let mut pairs: Vec<_> = cast_cols.iter().collect();
            pairs.sort();
            for (col, type_str) in pairs {
                if !flow.has(col) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot cast non-existent column '{col}'"),
                    ));
                }
                if parse_dtype(type_str).is_none() {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Invalid type string '{type_str}' for column '{col}'"),
                    ));
                }
            }
        }

        Step::TextTransform {
            columns, operator, ..
        } => {
            validate_columns_exist(columns, flow, idx, "transform", errors);
            if !operators::is_known(operator) {
                errors.push(ValidationError::step(
                    idx,
                    format!("Unknown text operator '{operator}'"),
                ));
            }
        }

        Step::Measure { expression } => match Formula::parse(expression, separator) {
            Ok(formula) => {
                validate_references(&formula.parsed.formula, flow, idx, errors);
                match formula.parsed.measure {
                    Some(name) => {
                        flow.columns.insert(name);
                    }
                    None => errors.push(ValidationError::step(
                        idx,
                        "A measure needs a name, as in Total = SUM([Sales])",
                    )),
                }
            }
            Err(e) => errors.push(ValidationError::step(
                idx,
                format!("Invalid formula '{expression}': {e}"),
            )),
        },

        Step::FilterRows { formula } => match Formula::parse(formula, separator) {
            Ok(parsed) => validate_references(&parsed.parsed.formula, flow, idx, errors),
            Err(e) => errors.push(ValidationError::step(
                idx,
                format!("Invalid formula '{formula}': {e}"),
            )),
        },

        Step::SortRows { by } => {
            let columns: Vec<String> = by.iter().map(|key| key.column.clone()).collect();
            validate_columns_exist(&columns, flow, idx, "sort by", errors);
        }

        Step::FindReplace {
            columns,
            search,
            use_regexp,
            ..
        } => {
            if let Some(columns) = columns {
                validate_columns_exist(columns, flow, idx, "search", errors);
            }

            if *use_regexp
                && let Err(e) = regex::Regex::new(search)
            {
                errors.push(ValidationError::step(
                    idx,
                    format!("Invalid regex pattern: {e}"),
                ));
            }
        }

        Step::FillNull {
            columns,
            strategy,
            value,
        } => {
            validate_columns_exist(columns, flow, idx, "fill nulls in", errors);
            if *strategy == FillStrategy::Value && value.is_none() {
                errors.push(ValidationError::step(
                    idx,
                    "The 'value' strategy needs a value",
                ));
            }
        }

        Step::Deduplicate { columns } => {
            if let Some(columns) = columns {
                validate_columns_exist(columns, flow, idx, "deduplicate on", errors);
            }
        }

        Step::Sql { query } => {
            if query.trim().is_empty() {
                errors.push(ValidationError::step(idx, "Empty SQL query"));
            }
            flow.known = false;
        }
    }
}

/// Checks the bare `[Column]` references of a formula
fn validate_references(
    node: &Node,
    flow: &ColumnFlow,
    idx: usize,
    errors: &mut Vec<ValidationError>,
) {
    match node {
        Node::Column { name } if !flow.has(name) => errors.push(ValidationError::step(
            idx,
            format!("Formula references non-existent column '{name}'"),
        )),
        Node::Function { arguments, .. } => {
            for argument in arguments {
                validate_references(argument, flow, idx, errors);
            }
        }
        Node::Operation(Operation::Binary { left, right, .. }) => {
            validate_references(left, flow, idx, errors);
            validate_references(right, flow, idx, errors);
        }
        Node::Operation(Operation::Unary { operand, .. }) => {
            validate_references(operand, flow, idx, errors);
        }
        _ => {}
    }
}

/// Helper to validate that all specified columns exist
fn validate_columns_exist(
    target_cols: &[String],
    flow: &ColumnFlow,
    step_idx: usize,
    operation: &str,
    errors: &mut Vec<ValidationError>,
) {
    for col in target_cols {
        if !flow.has(col) {
            errors.push(ValidationError::step(
                step_idx,
                format!("Cannot {operation} non-existent column '{col}'"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::spec::SchemaConfig;
    use crate::sheet::SortKey;
    use std::collections::HashMap;

    fn create_test_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("id".into(), DataType::Int64),
            Field::new("name".into(), DataType::String),
            Field::new("age".into(), DataType::Int64),
        ])
    }

    fn spec_with(steps: Vec<Step>) -> PipelineSpec {
        let mut spec = PipelineSpec::new("test");
        spec.steps = steps;
        spec
    }

    #[test]
    fn test_validate_drop_columns() {
        let spec = spec_with(vec![Step::DropColumns {
            columns: vec!["id".to_owned(), "nonexistent".to_owned()],
        }]);

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nonexistent"));
    }

    #[test]
    fn test_validate_rename_conflict() {
        let mut mapping = HashMap::new();
        mapping.insert("id".to_owned(), "name".to_owned());
        let spec = spec_with(vec![Step::RenameColumns { mapping }]);

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("target already exists"));
    }

    #[test]
    fn test_validate_schema_requirements() {
        let mut spec = spec_with(vec![]);
        spec.schema = SchemaConfig {
            match_mode: SchemaMatchMode::Strict,
            required_columns: vec!["id".to_owned(), "missing".to_owned()],
        };

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();

        assert!(errors.iter().any(|e| e.message.contains("missing")));
        assert!(errors.iter().any(|e| e.message.starts_with("Strict mode")));
    }

    #[test]
    fn test_validate_formulas_track_new_columns() {
        let spec = spec_with(vec![
            Step::Measure {
                expression: "Older = [age] + 1".to_owned(),
            },
            Step::FilterRows {
                formula: "= [Older] > 30".to_owned(),
            },
            Step::SortRows {
                by: vec![SortKey::new("Older", false)],
            },
        ]);

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_validate_reports_bad_steps() {
        let mut casts = HashMap::new();
        casts.insert("age".to_owned(), "int128".to_owned());
        let mut spec = spec_with(vec![
            Step::CastTypes { columns: casts },
            Step::TextTransform {
                columns: vec!["name".to_owned()],
                operator: "shout".to_owned(),
                args: Vec::new(),
            },
            Step::FindReplace {
                columns: None,
                search: "(".to_owned(),
                replace: String::new(),
                match_case: false,
                match_cell: false,
                use_regexp: true,
            },
            Step::FilterRows {
                formula: "= [height] > 2".to_owned(),
            },
            Step::Measure {
                expression: "= [age] +".to_owned(),
            },
        ]);
        spec.version = "9.9".to_owned();

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();
        let steps: Vec<Option<usize>> = errors.iter().map(|e| e.step_index).collect();
        assert_eq!(steps, [None, Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(errors[0].to_string(), "Schema: Unsupported spec version '9.9', expected '0.1'");
    }

    #[test]
    fn test_columns_after_sql_are_not_checked() {
        let spec = spec_with(vec![
            Step::Sql {
                query: "SELECT id AS key".to_owned(),
            },
            Step::DropColumns {
                columns: vec!["key".to_owned()],
            },
        ]);

        let errors = validate_pipeline(&spec, &create_test_schema()).unwrap();
        assert!(errors.is_empty());
    }
}
