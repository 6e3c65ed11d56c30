//! DAX-like formula language.
//!
//! A formula is either spreadsheet style (`= 1 + [Sales]`) or a measure
//! (`Total = SUM([Sales])`). Parsing produces a [`Node`] tree, and compilation
//! turns the tree into a Polars [`Expr`]:
//!
//! ```no_run
//! use eruo::formula::Formula;
//! use polars::prelude::*;
//!
//! let df = df!("Sales" => [1, 2, 3])?;
//! let formula = Formula::parse("Total = SUM([Sales])", ',')?;
//! let out = formula.evaluate(&df)?;
//! assert_eq!(out.column("Total")?.get(0)?, AnyValue::Int32(6));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ast;
pub mod compiler;
mod functions;
pub mod parser;
pub mod temporal;

use polars::prelude::*;
use std::fmt;

pub use ast::{BinaryOperator, Node, NumberLiteral, Operation, UnaryOperator};
pub use compiler::{FunctionTable, Value, compile, compile_formula};
pub use parser::{ParsedFormula, Parser, parse_dax};

/// Errors raised while parsing or compiling a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    InvalidSyntax,
    UnrecognizedTerm(String),
    /// Function name, already upper-cased
    Unsupported(String),
    /// Reference kinds the compiler cannot resolve yet
    NotYetSupported(&'static str),
    /// Function signature such as `SUM(column)`
    ArgumentCount(&'static str),
    /// Argument position (1-based) and function signature
    ArgumentType(usize, &'static str),
    Engine(String),
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyntax => write!(f, "Invalid syntax"),
            Self::UnrecognizedTerm(term) => {
                write!(f, "Unrecognized term or invalid expression: {term}")
            }
            Self::Unsupported(name) => write!(f, "{name}() is not found or not yet supported"),
            Self::NotYetSupported(what) => write!(f, "{what} is not yet supported"),
            Self::ArgumentCount(signature) => write!(f, "Invalid argument count for {signature}"),
            Self::ArgumentType(position, signature) => {
                write!(f, "Invalid type of argument {position} for {signature}")
            }
            Self::Engine(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FormulaError {}

impl From<PolarsError> for FormulaError {
    fn from(err: PolarsError) -> Self {
        Self::Engine(err.to_string())
    }
}

/// A parsed and compiled formula, ready to run against a frame.
#[derive(Debug, Clone)]
pub struct Formula {
    pub parsed: ParsedFormula,
    pub expr: Expr,
}

impl Formula {
    pub fn parse(input: &str, separator: char) -> Result<Self, FormulaError> {
        let parsed = parse_dax(input, separator)?;
        let expr = compile_formula(&parsed)?;
        Ok(Self { parsed, expr })
    }

    /// Name of the column the result is written to.
    pub fn output_name(&self) -> &str {
        self.parsed.measure.as_deref().unwrap_or("formula")
    }

    /// Evaluates the formula and attaches the result as a column.
    ///
    /// Scalar results such as aggregates are broadcast to every row.
    pub fn evaluate(&self, frame: &DataFrame) -> Result<DataFrame, FormulaError> {
        let name = self.output_name().to_owned();
        frame
            .clone()
            .lazy()
            .with_columns([self.expr.clone().alias(name)])
            .collect()
            .map_err(Into::into)
    }

    /// Evaluates the formula on its own, keeping scalar results scalar.
    pub fn evaluate_standalone(&self, frame: &DataFrame) -> Result<Column, FormulaError> {
        let name = self.output_name().to_owned();
        let out = frame
            .clone()
            .lazy()
            .select([self.expr.clone().alias(name.clone())])
            .collect()?;
        out.column(&name).cloned().map_err(Into::into)
    }
}
