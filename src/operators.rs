//! Named text operators applied to string columns.
//!
//! Operators are identified by the kebab-case names used in menus and in
//! pipeline `text_transform` steps. Most map onto Polars string expressions;
//! the rest run a per-value helper from [`strutil`].

pub mod strutil;

use anyhow::{Result, bail};
use polars::prelude::*;

/// Every operator name [`build_operation`] accepts.
pub const OPERATORS: &[&str] = &[
    "lowercase",
    "uppercase",
    "title-case",
    "sentence-case",
    "swap-text-case",
    "sponge-case",
    "camel-case",
    "pascal-case",
    "snake-case",
    "kebab-case",
    "constant-case",
    "dot-case",
    "append-prefix",
    "append-suffix",
    "wrap-with-text-same",
    "wrap-with-text-different",
    "remove-prefix-case-sensitive",
    "remove-prefix-case-insensitive",
    "remove-suffix-case-sensitive",
    "remove-suffix-case-insensitive",
    "pad-start-default",
    "pad-start-custom",
    "pad-end-default",
    "pad-end-custom",
    "trim-whitespace",
    "trim-start-whitespace",
    "trim-end-whitespace",
    "trim-whitespace-and-remove-new-lines",
    "remove-whitespaces",
    "remove-new-lines",
    "replace-whitespace-with-a-single-space",
    "replace-whitespace-and-new-lines-with-a-single-space",
    "encode-base64",
    "decode-base64",
    "encode-hexadecimal",
    "decode-hexadecimal",
    "encode-url",
    "decode-url",
    "unicode-normalization-nfc",
    "unicode-normalization-nfd",
    "unicode-normalization-nfkc",
    "unicode-normalization-nfkd",
    "slugify",
    "reverse-text",
    "split-by-characters",
    "pig-latinnify",
];

pub fn is_known(operator: &str) -> bool {
    OPERATORS.contains(&operator)
}

/// Applies a named operator to `expr`, which is read as text.
///
/// `args` carries the operator parameters: the affix for the append, wrap and
/// remove families, the width and fill character for padding, and the set of
/// separator characters for `split-by-characters`.
pub fn build_operation(expr: Expr, operator: &str, args: &[String]) -> Result<Expr> {
    let text = expr.cast(DataType::String);
    let out = match operator {
        "lowercase" => text.str().to_lowercase(),
        "uppercase" => text.str().to_uppercase(),
        "title-case" => map_text(text, strutil::title_case),
        "sentence-case" => map_text(text, strutil::sentence_case),
        "swap-text-case" => map_text(text, strutil::swap_case),
        "sponge-case" => map_text(text, |value| strutil::sponge_case(value, &mut rand::rng())),
        "camel-case" => map_text(text, strutil::camel_case),
        "pascal-case" => map_text(text, strutil::pascal_case),
        "snake-case" => map_text(text, strutil::snake_case),
        "kebab-case" => map_text(text, strutil::kebab_case),
        "constant-case" => map_text(text, strutil::constant_case),
        "dot-case" => map_text(text, strutil::dot_case),

        "append-prefix" => concat([lit(arg(operator, args, 0)?), text]),
        "append-suffix" => concat([text, lit(arg(operator, args, 0)?)]),
        "wrap-with-text-same" => {
            let wrap = arg(operator, args, 0)?;
            concat([lit(wrap), text, lit(wrap)])
        }
        "wrap-with-text-different" => concat([
            lit(arg(operator, args, 0)?),
            text,
            lit(arg(operator, args, 1)?),
        ]),
        "remove-prefix-case-sensitive" => {
            remove_pattern(text, &format!("^{}", regex::escape(arg(operator, args, 0)?)))
        }
        "remove-prefix-case-insensitive" => {
            remove_pattern(text, &format!("(?i)^{}", regex::escape(arg(operator, args, 0)?)))
        }
        "remove-suffix-case-sensitive" => {
            remove_pattern(text, &format!("{}$", regex::escape(arg(operator, args, 0)?)))
        }
        "remove-suffix-case-insensitive" => {
            remove_pattern(text, &format!("(?i){}$", regex::escape(arg(operator, args, 0)?)))
        }

        "pad-start-default" => text.str().pad_start(width(operator, args)?, ' '),
        "pad-start-custom" => text.str().pad_start(width(operator, args)?, fill(operator, args)?),
        "pad-end-default" => text.str().pad_end(width(operator, args)?, ' '),
        "pad-end-custom" => text.str().pad_end(width(operator, args)?, fill(operator, args)?),

        "trim-whitespace" => text.str().strip_chars(lit(NULL)),
        "trim-start-whitespace" => text.str().strip_chars_start(lit(NULL)),
        "trim-end-whitespace" => text.str().strip_chars_end(lit(NULL)),
        "trim-whitespace-and-remove-new-lines" => text
            .str()
            .strip_chars(lit(NULL))
            .str()
            .replace_all(lit("\n"), lit(""), true),
        "remove-whitespaces" => text.str().replace_all(lit(r"\s+"), lit(""), false),
        "remove-new-lines" => text.str().replace_all(lit(r"\n+"), lit(""), false),
        "replace-whitespace-with-a-single-space" => {
            text.str().replace_all(lit(r"\s+"), lit(" "), false)
        }
        "replace-whitespace-and-new-lines-with-a-single-space" => {
            text.str().replace_all(lit(r"[\s\n]+"), lit(" "), false)
        }

        "encode-base64" => text.str().base64_encode(),
        "decode-base64" => binary_to_text(text.str().base64_decode(false)),
        "encode-hexadecimal" => text.str().hex_encode(),
        "decode-hexadecimal" => binary_to_text(text.str().hex_decode(false)),
        "encode-url" => map_text(text, strutil::url_encode),
        "decode-url" => map_text(text, strutil::url_decode),

        "unicode-normalization-nfc" => text.str().normalize(UnicodeForm::NFC),
        "unicode-normalization-nfd" => text.str().normalize(UnicodeForm::NFD),
        "unicode-normalization-nfkc" => text.str().normalize(UnicodeForm::NFKC),
        "unicode-normalization-nfkd" => text.str().normalize(UnicodeForm::NFKD),

        "slugify" => text
            .str()
            .to_lowercase()
            .str()
            .replace_all(lit("[^a-z0-9]+"), lit("-"), false)
            .str()
            .strip_chars(lit("-")),
        "reverse-text" => text.str().reverse(),
        "split-by-characters" => {
            let characters = arg(operator, args, 0)?.to_owned();
            map_text(text, move |value| strutil::split_by_chars(value, &characters))
        }
        "pig-latinnify" => map_text(text, strutil::pig_latinnify),

        _ => bail!("Unsupported operator: {operator}"),
    };
    Ok(out)
}

fn arg<'a>(operator: &str, args: &'a [String], index: usize) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => bail!("Missing argument {} for {operator}", index + 1),
    }
}

fn width(operator: &str, args: &[String]) -> Result<usize> {
    let raw = arg(operator, args, 0)?;
    match raw.trim().parse() {
        Ok(width) => Ok(width),
        Err(_) => bail!("Invalid width for {operator}: {raw}"),
    }
}

fn fill(operator: &str, args: &[String]) -> Result<char> {
    let raw = arg(operator, args, 1)?;
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("Fill for {operator} must be a single character: {raw:?}"),
    }
}

fn concat<const N: usize>(parts: [Expr; N]) -> Expr {
    concat_str(parts, "", false)
}

fn remove_pattern(text: Expr, pattern: &str) -> Expr {
    text.str().replace(lit(pattern), lit(""), false)
}

/// Runs `f` over every non-null value of a string expression.
pub(crate) fn map_text<F>(expr: Expr, f: F) -> Expr
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    expr.map(
        move |column: Column| {
            let out = column
                .str()?
                .apply_into_string_amortized(|value, buf| buf.push_str(&f(value)));
            Ok(Some(out.into_column()))
        },
        GetOutput::from_type(DataType::String),
    )
}

/// Decoded bytes are shown as text, with invalid UTF-8 replaced.
fn binary_to_text(expr: Expr) -> Expr {
    expr.map(
        |column: Column| {
            let out: StringChunked = column
                .binary()?
                .into_iter()
                .map(|bytes| bytes.map(|b| String::from_utf8_lossy(b).into_owned()))
                .collect();
            Ok(Some(out.with_name(column.name().clone()).into_column()))
        },
        GetOutput::from_type(DataType::String),
    )
}
