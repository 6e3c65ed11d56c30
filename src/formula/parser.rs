//! Recursive-descent parser over operator precedence levels.
//!
//! Each level looks for its operators at the top level of the input (outside
//! quotes, parentheses and brackets), scanning from the right so that binary
//! operators associate to the left.

use regex::Regex;
use std::sync::LazyLock;

use super::FormulaError;
use super::ast::{BinaryOperator, Node, NumberLiteral, UnaryOperator};

const WORD_OPERATORS: [&str; 6] = ["AND", "OR", "XOR", "NOT", "XAND", "XNOR"];

const CONSTANTS: [&str; 8] = [
    "SECOND", "MINUTE", "HOUR", "DAY", "WEEK", "MONTH", "QUARTER", "YEAR",
];

static DOUBLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^"([^"]*)"$"#).expect("valid regex"));
static SINGLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'(.*)'$").expect("valid regex"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));
static FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([a-zA-Z_0-9]+)\s*\((.*)\)\s*$").expect("valid regex"));
static CELL_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z]+\d+:[A-Z]+\d+$").expect("valid regex"));
static CELL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z]+\d+$").expect("valid regex"));
static TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid regex"));
static TABLE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9_]+)\[(.*)\]$").expect("valid regex"));
static QUOTED_TABLE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^'([^']*)'\[(.*)\]$").expect("valid regex"));
static COLUMN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[(.*)\]$").expect("valid regex"));
static MEASURE_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*=\s*").expect("valid regex"));

/// Output of [`parse_dax`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    /// Set for `Name = ...` input, absent for `= ...`
    pub measure: Option<String>,
    pub formula: Node,
}

/// Parses `= expr` (spreadsheet form) or `Name = expr` (measure form).
pub fn parse_dax(input: &str, separator: char) -> Result<ParsedFormula, FormulaError> {
    let input = input.trim();
    let parser = Parser::new(separator);

    if let Some(rest) = input.strip_prefix('=') {
        return Ok(ParsedFormula {
            measure: None,
            formula: parser.parse(rest.trim())?,
        });
    }

    let mut parts = MEASURE_SPLIT.splitn(input, 2);
    match (parts.next(), parts.next()) {
        (Some(measure), Some(formula)) => Ok(ParsedFormula {
            measure: Some(measure.trim().to_owned()),
            formula: parser.parse(formula.trim())?,
        }),
        _ => Err(FormulaError::InvalidSyntax),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Parser {
    separator: char,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(',')
    }
}

impl Parser {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Parses an expression without the leading `=` or measure name.
    pub fn parse(&self, input: &str) -> Result<Node, FormulaError> {
        self.parse_xand(input)
    }

    fn parse_xand(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["XAND", "XNOR"], Self::parse_xand, Self::parse_or)
    }

    fn parse_or(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["OR"], Self::parse_or, Self::parse_xor)
    }

    fn parse_xor(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["XOR"], Self::parse_xor, Self::parse_and)
    }

    fn parse_and(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["AND"], Self::parse_and, Self::parse_not)
    }

    fn parse_not(&self, input: &str) -> Result<Node, FormulaError> {
        let trimmed = input.trim();
        if let Some(rest) = strip_prefix_word(trimmed, "NOT") {
            let operand = self.parse_not(rest)?;
            return Ok(Node::unary(UnaryOperator::Not, operand));
        }
        self.parse_comparison(trimmed)
    }

    fn parse_comparison(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(
            input,
            &[">=", "<=", "==", "=", "!=", "<>", ">", "<"],
            Self::parse_comparison,
            Self::parse_bit_or,
        )
    }

    fn parse_bit_or(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["|"], Self::parse_bit_or, Self::parse_bit_xor)
    }

    fn parse_bit_xor(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["^"], Self::parse_bit_xor, Self::parse_bit_and)
    }

    fn parse_bit_and(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(input, &["&"], Self::parse_bit_and, Self::parse_additive)
    }

    fn parse_additive(&self, input: &str) -> Result<Node, FormulaError> {
        // A sign directly after another operator belongs to the right operand.
        let split = top_level_operators(input, &["+", "-"])
            .into_iter()
            .find(|&(index, _)| {
                let left = input.get(..index).unwrap_or_default().trim_end();
                left.is_empty() || !left.ends_with(is_operator_char)
            });

        match split {
            Some((index, token)) => {
                let (left, right) = split_at_operator(input, index, token);
                if left.is_empty() {
                    return self.parse_multiplicative(input);
                }
                let operator = operator_of(token)?;
                Ok(Node::binary(
                    operator,
                    self.parse_additive(left)?,
                    self.parse_multiplicative(right)?,
                ))
            }
            None => self.parse_multiplicative(input),
        }
    }

    fn parse_multiplicative(&self, input: &str) -> Result<Node, FormulaError> {
        self.left_binary(
            input,
            &["//", "*", "/", "%"],
            Self::parse_multiplicative,
            Self::parse_power,
        )
    }

    fn parse_power(&self, input: &str) -> Result<Node, FormulaError> {
        // Leftmost split makes `**` right-associative.
        match top_level_operators(input, &["**"]).last() {
            Some(&(index, token)) => {
                let (left, right) = split_at_operator(input, index, token);
                Ok(Node::binary(
                    BinaryOperator::Power,
                    self.parse_negation(left)?,
                    self.parse_power(right)?,
                ))
            }
            None => self.parse_negation(input),
        }
    }

    fn parse_negation(&self, input: &str) -> Result<Node, FormulaError> {
        let trimmed = input.trim();
        if let Some(rest) = trimmed.strip_prefix('-') {
            let operand = self.parse_negation(rest)?;
            return Ok(Node::unary(UnaryOperator::Negate, operand));
        }
        self.parse_value(trimmed)
    }

    fn parse_value(&self, input: &str) -> Result<Node, FormulaError> {
        let trimmed = input.trim();
        if let Some(inner) = strip_enclosing_parens(trimmed) {
            return self.parse_xand(inner.trim());
        }
        self.parse_term(trimmed)
    }

    fn parse_term(&self, term: &str) -> Result<Node, FormulaError> {
        if let Some(caps) = DOUBLE_QUOTED.captures(term).or_else(|| SINGLE_QUOTED.captures(term)) {
            return Ok(Node::String {
                value: caps.get(1).map_or("", |m| m.as_str()).to_owned(),
            });
        }

        if NUMBER.is_match(term) {
            let value = match term.parse::<i64>() {
                Ok(i) => NumberLiteral::Integer(i),
                Err(_) => NumberLiteral::Float(
                    term.parse::<f64>()
                        .map_err(|_| FormulaError::UnrecognizedTerm(term.to_owned()))?,
                ),
            };
            return Ok(Node::Number { value });
        }

        if let Some(caps) = FUNCTION.captures(term) {
            let name = caps.get(1).map_or("", |m| m.as_str()).to_owned();
            let body = caps.get(2).map_or("", |m| m.as_str());
            let arguments = split_arguments(body, self.separator);
            let arguments = if arguments.len() == 1 && arguments.first().is_some_and(String::is_empty) {
                Vec::new()
            } else {
                arguments
                    .iter()
                    .map(|arg| self.parse_xand(arg))
                    .collect::<Result<Vec<_>, _>>()?
            };
            return Ok(Node::Function { name, arguments });
        }

        let upper = term.to_uppercase();
        if CONSTANTS.contains(&upper.as_str()) {
            return Ok(Node::Constant { value: upper });
        }

        if TABLE.is_match(term) {
            return Ok(Node::Table {
                name: term.to_owned(),
            });
        }

        if let Some(caps) = TABLE_COLUMN
            .captures(term)
            .or_else(|| QUOTED_TABLE_COLUMN.captures(term))
        {
            return Ok(Node::TableColumn {
                table: caps.get(1).map_or("", |m| m.as_str()).to_owned(),
                column: caps.get(2).map_or("", |m| m.as_str()).to_owned(),
            });
        }

        if let Some(caps) = COLUMN.captures(term) {
            return Ok(Node::Column {
                name: caps.get(1).map_or("", |m| m.as_str()).to_owned(),
            });
        }

        // Bare names such as `B12` already matched as tables above
        if CELL_RANGE.is_match(term) {
            return Ok(Node::CellRange {
                value: term.to_owned(),
            });
        }

        if CELL_REFERENCE.is_match(term) {
            return Ok(Node::CellReference {
                value: term.to_owned(),
            });
        }

        Err(FormulaError::UnrecognizedTerm(term.to_owned()))
    }

    /// Splits at the rightmost top-level operator: the left side recurses into
    /// the same level, the right side goes one level down.
    fn left_binary(
        &self,
        input: &str,
        operators: &[&'static str],
        same: fn(&Self, &str) -> Result<Node, FormulaError>,
        next: fn(&Self, &str) -> Result<Node, FormulaError>,
    ) -> Result<Node, FormulaError> {
        match top_level_operators(input, operators).first() {
            Some(&(index, token)) => {
                let (left, right) = split_at_operator(input, index, token);
                let operator = operator_of(token)?;
                Ok(Node::binary(operator, same(self, left)?, next(self, right)?))
            }
            None => next(self, input),
        }
    }
}

fn operator_of(token: &str) -> Result<BinaryOperator, FormulaError> {
    BinaryOperator::from_token(token).ok_or(FormulaError::InvalidSyntax)
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '%' | '^' | '&' | '|' | '=' | '<' | '>' | '!'
    )
}

fn split_at_operator<'a>(input: &'a str, index: usize, token: &str) -> (&'a str, &'a str) {
    let left = input.get(..index).unwrap_or_default().trim();
    let right = input.get(index + token.len()..).unwrap_or_default().trim();
    (left, right)
}

/// Strips a leading word operator when it stands alone as a prefix.
fn strip_prefix_word<'a>(input: &'a str, word: &str) -> Option<&'a str> {
    let head = input.get(..word.len())?;
    if !head.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = input.get(word.len()..)?;
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '(' => None,
        _ => Some(rest),
    }
}

/// Tracks quoting and nesting while walking through a formula.
#[derive(Default)]
struct Nesting {
    single_quote: bool,
    double_quote: bool,
    parens: i32,
    brackets: i32,
}

impl Nesting {
    /// Updates the state for `c`. `opening` is +1 when walking forwards and
    /// -1 when walking backwards.
    fn step(&mut self, c: char, opening: i32) {
        match c {
            '\'' if !self.double_quote => self.single_quote = !self.single_quote,
            '"' if !self.single_quote => self.double_quote = !self.double_quote,
            _ if self.single_quote || self.double_quote => {}
            '(' => self.parens += opening,
            ')' => self.parens -= opening,
            '[' => self.brackets += opening,
            ']' => self.brackets -= opening,
            _ => {}
        }
    }

    fn at_top_level(&self) -> bool {
        !self.single_quote && !self.double_quote && self.parens == 0 && self.brackets == 0
    }
}

/// Finds every top-level occurrence of `operators`, rightmost first.
/// Returns byte offsets of the operator start.
fn top_level_operators(input: &str, operators: &[&'static str]) -> Vec<(usize, &'static str)> {
    let mut sorted: Vec<&'static str> = operators.to_vec();
    sorted.sort_by_key(|op| std::cmp::Reverse(op.len()));

    let mut found = Vec::new();
    let mut nesting = Nesting::default();
    let mut skip_below: Option<usize> = None;

    for (i, c) in input.char_indices().rev() {
        nesting.step(c, -1);
        if !nesting.at_top_level() {
            continue;
        }
        if skip_below.is_some_and(|limit| i >= limit) {
            continue;
        }

        let end = i + c.len_utf8();
        for op in &sorted {
            let Some(start) = end.checked_sub(op.len()) else {
                continue;
            };
            let Some(candidate) = input.get(start..end) else {
                continue;
            };
            if !candidate.eq_ignore_ascii_case(op) {
                continue;
            }

            let before = input.get(..start).and_then(|s| s.chars().next_back());
            let after = input.get(end..).and_then(|s| s.chars().next());

            if *op == "*" && (before == Some('*') || after == Some('*')) {
                continue;
            }

            if WORD_OPERATORS.contains(op) {
                if after == Some('(') {
                    continue;
                }
                let boundary_before = before.is_none_or(|b| !b.is_alphanumeric());
                let boundary_after = after.is_none_or(|a| !a.is_alphanumeric());
                if !(boundary_before && boundary_after) {
                    continue;
                }
            }

            found.push((start, *op));
            skip_below = Some(start);
            break;
        }
    }

    found
}

/// Returns the inside of `(...)` when the outer parentheses pair with each other.
fn strip_enclosing_parens(input: &str) -> Option<&str> {
    let inner = input.strip_prefix('(')?.strip_suffix(')')?;
    let mut nesting = Nesting {
        parens: 1,
        ..Nesting::default()
    };
    for c in inner.chars() {
        nesting.step(c, 1);
        if nesting.parens == 0 {
            return None;
        }
    }
    Some(inner)
}

/// Splits function arguments on top-level separators.
fn split_arguments(input: &str, separator: char) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;

    for (i, c) in input.char_indices() {
        nesting.step(c, 1);
        if c == separator && nesting.at_top_level() {
            arguments.push(input.get(start..i).unwrap_or_default().trim().to_owned());
            start = i + c.len_utf8();
        }
    }
    arguments.push(input.get(start..).unwrap_or_default().trim().to_owned());
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::Operation;

    fn parse(input: &str) -> Node {
        parse_dax(input, ',').unwrap().formula
    }

    fn binary_parts(node: &Node) -> (BinaryOperator, &Node, &Node) {
        match node {
            Node::Operation(Operation::Binary {
                operator,
                left,
                right,
            }) => (*operator, left, right),
            other => panic!("expected binary operation, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence_of_arithmetic() {
        let node = parse("= 1 + 2 * 3 / (4 - 1)");
        let (op, left, right) = binary_parts(&node);
        assert_eq!(op, BinaryOperator::Add);
        assert_eq!(*left, Node::integer(1));

        let (op, product, difference) = binary_parts(right);
        assert_eq!(op, BinaryOperator::Divide);
        assert_eq!(binary_parts(product).0, BinaryOperator::Multiply);
        assert_eq!(binary_parts(difference).0, BinaryOperator::Subtract);
    }

    #[test]
    fn test_logical_precedence() {
        let node = parse("= NOT (TRUE() AND FALSE()) OR (10 > 5)");
        let (op, left, right) = binary_parts(&node);
        assert_eq!(op, BinaryOperator::Or);
        assert_eq!(binary_parts(right).0, BinaryOperator::Greater);

        let Node::Operation(Operation::Unary { operator, operand }) = left else {
            panic!("expected NOT, got {left:?}");
        };
        assert_eq!(*operator, UnaryOperator::Not);
        let (op, l, r) = binary_parts(operand);
        assert_eq!(op, BinaryOperator::And);
        assert!(matches!(l, Node::Function { name, arguments } if name == "TRUE" && arguments.is_empty()));
        assert!(matches!(r, Node::Function { name, .. } if name == "FALSE"));
    }

    #[test]
    fn test_measure_form() {
        let parsed = parse_dax(
            r#"Total Sales = CALCULATE(SUM([Sales Amount]), 'Sales'[City] = "Cimahi")"#,
            ',',
        )
        .unwrap();
        assert_eq!(parsed.measure.as_deref(), Some("Total Sales"));

        let Node::Function { name, arguments } = parsed.formula else {
            panic!("expected function");
        };
        assert_eq!(name, "CALCULATE");
        assert_eq!(arguments.len(), 2);
        let (op, left, right) = binary_parts(&arguments[1]);
        assert_eq!(op, BinaryOperator::Equal);
        assert_eq!(
            *left,
            Node::TableColumn {
                table: "Sales".into(),
                column: "City".into()
            }
        );
        assert_eq!(
            *right,
            Node::String {
                value: "Cimahi".into()
            }
        );
    }

    #[test]
    fn test_terms() {
        assert_eq!(
            parse("= 'Sales Data'[Sales Amount]"),
            Node::TableColumn {
                table: "Sales Data".into(),
                column: "Sales Amount".into()
            }
        );
        assert_eq!(parse("= [Sales Amount]"), Node::Column { name: "Sales Amount".into() });
        assert_eq!(parse("= month"), Node::Constant { value: "MONTH".into() });
        assert_eq!(parse("= B12"), Node::Table { name: "B12".into() });
        assert_eq!(parse("= A1:C3"), Node::CellRange { value: "A1:C3".into() });
        assert_eq!(parse("= Sales"), Node::Table { name: "Sales".into() });
        assert_eq!(
            parse("= 2.5"),
            Node::Number {
                value: NumberLiteral::Float(2.5)
            }
        );
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(
            parse_dax("Lorem ipsum dolor sit amet.", ','),
            Err(FormulaError::InvalidSyntax)
        );
        assert_eq!(
            parse_dax("= 1 + $$", ','),
            Err(FormulaError::UnrecognizedTerm("$$".into()))
        );
    }

    #[test]
    fn test_unary_minus_after_operator() {
        let node = parse("= 5 * -3");
        let (op, _, right) = binary_parts(&node);
        assert_eq!(op, BinaryOperator::Multiply);
        assert!(matches!(
            right,
            Node::Operation(Operation::Unary {
                operator: UnaryOperator::Negate,
                ..
            })
        ));

        let node = parse("= 5 - -3");
        assert_eq!(binary_parts(&node).0, BinaryOperator::Subtract);
    }

    #[test]
    fn test_power_is_right_associative() {
        let node = parse("= 2 ** 3 ** 2");
        let (op, left, right) = binary_parts(&node);
        assert_eq!(op, BinaryOperator::Power);
        assert_eq!(*left, Node::integer(2));
        assert_eq!(binary_parts(right).0, BinaryOperator::Power);
    }

    #[test]
    fn test_word_operators_need_boundaries() {
        let node = parse("= [ORDERS] > 1 AND [BRAND] = \"x\"");
        assert_eq!(binary_parts(&node).0, BinaryOperator::And);

        // OR( ... ) is a function call, not an operator
        assert!(matches!(parse("= OR(1, 0)"), Node::Function { .. }));
    }

    #[test]
    fn test_separator_is_configurable() {
        let node = parse_dax("= DIVIDE(1; 2)", ';').unwrap().formula;
        let Node::Function { arguments, .. } = node else {
            panic!("expected function");
        };
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn test_quoted_operators_are_ignored() {
        assert_eq!(parse("= \"a + b\""), Node::String { value: "a + b".into() });
    }

    #[test]
    fn test_parens_that_do_not_pair() {
        let node = parse("= (1 + 2) * (3 + 4)");
        assert_eq!(binary_parts(&node).0, BinaryOperator::Multiply);
    }
}
