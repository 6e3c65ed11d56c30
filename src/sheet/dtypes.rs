//! Display names and classes of column data types.

use polars::prelude::*;

/// Coarse grouping used to decide which operations a column accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeClass {
    Numeric,
    Temporal,
    Time,
    Duration,
    Boolean,
    Text,
    Category,
    Null,
    List,
    Struct,
    Binary,
    Other,
}

impl DtypeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Temporal => "temporal",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Category => "category",
            Self::Null => "null",
            Self::List => "list",
            Self::Struct => "struct",
            Self::Binary => "binary",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DtypeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `(short, long)` names, `("?", "unknown")` for types the sheet does not handle.
fn names(dtype: &DataType) -> (&'static str, &'static str) {
    match dtype {
        DataType::Categorical(..) | DataType::Enum(..) => ("cat", "categorical"),
        DataType::Int8 => ("i8", "integer 8"),
        DataType::Int16 => ("i16", "integer 16"),
        DataType::Int32 => ("i32", "integer 32"),
        DataType::Int64 => ("i64", "integer 64"),
        DataType::UInt8 => ("u8", "unsigned integer 8"),
        DataType::UInt16 => ("u16", "unsigned integer 16"),
        DataType::UInt32 => ("u32", "unsigned integer 32"),
        DataType::UInt64 => ("u64", "unsigned integer 64"),
        DataType::Float32 => ("f32", "float 32"),
        DataType::Float64 => ("f64", "float 64"),
        DataType::Decimal(..) => ("dec.", "decimal"),
        DataType::Date => ("date", "date"),
        DataType::Time => ("time", "time"),
        DataType::Datetime(..) => ("date.", "datetime"),
        DataType::Duration(..) => ("dur.", "duration"),
        DataType::Boolean => ("bool", "boolean"),
        DataType::String => ("text", "text"),
        DataType::Null => ("null", "null"),
        DataType::List(_) => ("list", "list"),
        DataType::Struct(_) => ("struct", "struct"),
        DataType::Binary | DataType::BinaryOffset => ("bin.", "binary"),
        _ => ("?", "unknown"),
    }
}

pub fn short_name(dtype: &DataType) -> &'static str {
    names(dtype).0
}

pub fn long_name(dtype: &DataType) -> &'static str {
    names(dtype).1
}

pub fn class_of(dtype: &DataType) -> DtypeClass {
    match dtype {
        DataType::Categorical(..) | DataType::Enum(..) => DtypeClass::Category,
        dt if dt.is_primitive_numeric() || matches!(dt, DataType::Decimal(..)) => {
            DtypeClass::Numeric
        }
        DataType::Date | DataType::Datetime(..) => DtypeClass::Temporal,
        DataType::Time => DtypeClass::Time,
        DataType::Duration(_) => DtypeClass::Duration,
        DataType::Boolean => DtypeClass::Boolean,
        DataType::String => DtypeClass::Text,
        DataType::Null => DtypeClass::Null,
        DataType::List(_) => DtypeClass::List,
        DataType::Struct(_) => DtypeClass::Struct,
        DataType::Binary | DataType::BinaryOffset => DtypeClass::Binary,
        _ => DtypeClass::Other,
    }
}

/// Resolves a short name, a long name or one of the loose aliases pipeline
/// files use (`Numeric`, `String`, `Temporal`...). Matching ignores case.
pub fn parse_dtype(name: &str) -> Option<DataType> {
    let dtype = match name.trim().to_lowercase().as_str() {
        "cat" | "categorical" => DataType::Categorical(None, CategoricalOrdering::Lexical),
        "i8" | "integer 8" => DataType::Int8,
        "i16" | "integer 16" => DataType::Int16,
        "i32" | "integer 32" => DataType::Int32,
        "i64" | "integer 64" | "integer" | "numeric" => DataType::Int64,
        "u8" | "unsigned integer 8" => DataType::UInt8,
        "u16" | "unsigned integer 16" => DataType::UInt16,
        "u32" | "unsigned integer 32" => DataType::UInt32,
        "u64" | "unsigned integer 64" => DataType::UInt64,
        "f32" | "float 32" => DataType::Float32,
        "f64" | "float 64" | "float" => DataType::Float64,
        "dec." | "decimal" => DataType::Decimal(None, None),
        "date" => DataType::Date,
        "time" => DataType::Time,
        "date." | "datetime" | "temporal" => {
            DataType::Datetime(TimeUnit::Microseconds, None)
        }
        "dur." | "duration" => DataType::Duration(TimeUnit::Microseconds),
        "bool" | "boolean" => DataType::Boolean,
        "text" | "string" | "str" => DataType::String,
        "null" => DataType::Null,
        "bin." | "binary" => DataType::Binary,
        _ => return None,
    };
    Some(dtype)
}
