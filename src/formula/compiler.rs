//! Turns a [`Node`] tree into a Polars expression.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;

use super::ast::{BinaryOperator, Node, NumberLiteral, Operation, UnaryOperator};
use super::parser::ParsedFormula;
use super::{FormulaError, functions, temporal};

/// Which function names a formula may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTable {
    /// `= ...` formulas
    Spreadsheet,
    /// `Name = ...` measures
    Dax,
}

/// Result of compiling a node.
///
/// Literals stay unwrapped so that functions can inspect them (a text argument
/// may be a date, a column name or an interval keyword).
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Constant(String),
    Column(String),
    Date(NaiveDate),
    Datetime(NaiveDateTime),
    Time(NaiveTime),
    Expr(Expr),
}

impl Value {
    pub fn into_expr(self) -> Expr {
        match self {
            Self::Text(s) | Self::Constant(s) => lit(s),
            Self::Integer(i) => lit(i),
            Self::Float(f) => lit(f),
            Self::Column(name) => col(name),
            Self::Date(d) => lit(d),
            Self::Datetime(dt) => lit(dt),
            Self::Time(t) => time_literal(t),
            Self::Expr(e) => e,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Self::Column(_))
    }

    /// Text that reads as a time or a date becomes a temporal literal.
    fn coerce_temporal(self) -> Self {
        match self {
            Self::Text(text) => {
                if let Some(time) = temporal::parse_time(&text) {
                    Self::Time(time)
                } else if let Some(datetime) = temporal::parse_datetime(&text) {
                    Self::Datetime(datetime)
                } else {
                    Self::Text(text)
                }
            }
            other => other,
        }
    }
}

pub(crate) fn time_literal(time: NaiveTime) -> Expr {
    lit(temporal::time_to_nanos(time)).cast(DataType::Time)
}

/// Compiles a parsed formula with the function table its form selects.
pub fn compile_formula(parsed: &ParsedFormula) -> Result<Expr, FormulaError> {
    let table = if parsed.measure.is_some() {
        FunctionTable::Dax
    } else {
        FunctionTable::Spreadsheet
    };
    compile(&parsed.formula, table).map(Value::into_expr)
}

pub fn compile(node: &Node, table: FunctionTable) -> Result<Value, FormulaError> {
    match node {
        Node::String { value } => Ok(Value::Text(value.clone())),
        Node::Number { value } => Ok(match *value {
            NumberLiteral::Integer(i) => Value::Integer(i),
            NumberLiteral::Float(f) => Value::Float(f),
        }),
        Node::Constant { value } => Ok(Value::Constant(value.clone())),
        Node::Table { .. } => Err(FormulaError::NotYetSupported("Table reference")),
        Node::TableColumn { .. } => Err(FormulaError::NotYetSupported("Table column reference")),
        Node::CellRange { .. } | Node::CellReference { .. } => Err(
            FormulaError::NotYetSupported("Cell reference and range are"),
        ),
        Node::Column { name } => Ok(Value::Column(name.clone())),
        Node::Function { name, arguments } => {
            let args = arguments
                .iter()
                .map(|arg| compile(arg, table))
                .collect::<Result<Vec<_>, _>>()?;
            let upper = name.to_uppercase();
            let result = match table {
                FunctionTable::Dax => functions::dax(&upper, args)?,
                FunctionTable::Spreadsheet => None,
            };
            result.ok_or(FormulaError::Unsupported(upper))
        }
        Node::Operation(Operation::Unary { operator, operand }) => {
            let value = compile(operand, table)?;
            Ok(match operator {
                UnaryOperator::Negate => match value {
                    Value::Integer(i) => Value::Integer(-i),
                    Value::Float(f) => Value::Float(-f),
                    other => Value::Expr(lit(0) - other.into_expr()),
                },
                UnaryOperator::Not => Value::Expr(value.into_expr().not()),
            })
        }
        Node::Operation(Operation::Binary {
            operator,
            left,
            right,
        }) => {
            let left = compile(left, table)?.coerce_temporal().into_expr();
            let right = compile(right, table)?.coerce_temporal().into_expr();
            Ok(Value::Expr(binary_expr(*operator, left, right)))
        }
    }
}

fn binary_expr(operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
    match operator {
        BinaryOperator::GreaterEqual => left.gt_eq(right),
        BinaryOperator::LessEqual => left.lt_eq(right),
        BinaryOperator::DoubleEqual | BinaryOperator::Equal => left.eq(right),
        BinaryOperator::NotEqual | BinaryOperator::Different => left.neq(right),
        BinaryOperator::Greater => left.gt(right),
        BinaryOperator::Less => left.lt(right),
        BinaryOperator::And | BinaryOperator::BitAnd => left.and(right),
        BinaryOperator::Or | BinaryOperator::BitOr => left.or(right),
        BinaryOperator::Xor | BinaryOperator::BitXor => left.xor(right),
        BinaryOperator::Xand => left
            .clone()
            .and(right.clone())
            .or(left.not().and(right.not())),
        BinaryOperator::Add => left + right,
        BinaryOperator::Subtract => left - right,
        BinaryOperator::Multiply => left * right,
        BinaryOperator::Divide => left.cast(DataType::Float64) / right.cast(DataType::Float64),
        BinaryOperator::FloorDivide => left.floor_div(right),
        BinaryOperator::Modulo => left % right,
        BinaryOperator::Power => left.pow(right),
    }
}
