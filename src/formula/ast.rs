use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed formula tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    String {
        value: String,
    },
    Number {
        value: NumberLiteral,
    },
    /// Interval keyword such as `MONTH`, always upper-case
    Constant {
        value: String,
    },
    Table {
        name: String,
    },
    TableColumn {
        table: String,
        column: String,
    },
    Column {
        name: String,
    },
    CellRange {
        value: String,
    },
    CellReference {
        value: String,
    },
    Function {
        name: String,
        arguments: Vec<Node>,
    },
    Operation(Operation),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberLiteral {
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operation {
    Binary {
        operator: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    #[serde(rename = "XAND")]
    Xand,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "XOR")]
    Xor,
    #[serde(rename = "AND")]
    And,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "==")]
    DoubleEqual,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<>")]
    Different,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "|")]
    BitOr,
    #[serde(rename = "^")]
    BitXor,
    #[serde(rename = "&")]
    BitAnd,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "//")]
    FloorDivide,
    #[serde(rename = "%")]
    Modulo,
    #[serde(rename = "**")]
    Power,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Xand => "XAND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::And => "AND",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::DoubleEqual => "==",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Different => "<>",
            Self::Greater => ">",
            Self::Less => "<",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::FloorDivide => "//",
            Self::Modulo => "%",
            Self::Power => "**",
        }
    }

    /// Maps an operator token found by the parser. `XNOR` folds into `XAND`.
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.to_uppercase().as_str() {
            "XAND" | "XNOR" => Self::Xand,
            "OR" => Self::Or,
            "XOR" => Self::Xor,
            "AND" => Self::And,
            ">=" => Self::GreaterEqual,
            "<=" => Self::LessEqual,
            "==" => Self::DoubleEqual,
            "=" => Self::Equal,
            "!=" => Self::NotEqual,
            "<>" => Self::Different,
            ">" => Self::Greater,
            "<" => Self::Less,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&" => Self::BitAnd,
            "+" => Self::Add,
            "-" => Self::Subtract,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            "//" => Self::FloorDivide,
            "%" => Self::Modulo,
            "**" => Self::Power,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    #[serde(rename = "-")]
    Negate,
    #[serde(rename = "NOT")]
    Not,
}

impl Node {
    pub fn binary(operator: BinaryOperator, left: Self, right: Self) -> Self {
        Self::Operation(Operation::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(operator: UnaryOperator, operand: Self) -> Self {
        Self::Operation(Operation::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn integer(value: i64) -> Self {
        Self::Number {
            value: NumberLiteral::Integer(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serializes_in_dictionary_shape() {
        let node = Node::binary(BinaryOperator::Add, Node::integer(1), Node::integer(2));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "operation");
        assert_eq!(json["operator"], "+");
        assert_eq!(json["left"]["type"], "number");
        assert_eq!(json["left"]["value"], 1);

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_unary_operation_uses_operand_key() {
        let node = Node::unary(UnaryOperator::Not, Node::Column { name: "Flag".into() });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "operation");
        assert_eq!(json["operator"], "NOT");
        assert_eq!(json["operand"]["name"], "Flag");
    }

    #[test]
    fn test_xnor_folds_into_xand() {
        assert_eq!(BinaryOperator::from_token("xnor"), Some(BinaryOperator::Xand));
        assert_eq!(BinaryOperator::from_token("<>"), Some(BinaryOperator::Different));
        assert_eq!(BinaryOperator::from_token("??"), None);
    }
}
