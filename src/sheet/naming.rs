//! Column naming rules of the sheet.

use std::sync::LazyLock;

use regex::Regex;

static NUMBER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d+$").expect("valid regex"));

/// `<base>_N` where N is one past the largest `N` already used after `base_`.
pub fn next_suffixed_name<'a>(base: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let prefix = format!("{base}_");
    let number = columns
        .into_iter()
        .filter_map(|name| name.strip_prefix(&prefix))
        .filter_map(leading_number)
        .map(|n| n + 1)
        .max()
        .unwrap_or(1)
        .max(1);
    format!("{base}_{number}")
}

fn leading_number(text: &str) -> Option<usize> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text.get(..end)?.parse().ok()
}

/// Name for a copy of `name`. A `_N` suffix is replaced by the next free one.
pub fn duplicate_name<'a>(name: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let base = NUMBER_SUFFIX.replace(name, "");
    next_suffixed_name(&base, columns)
}

/// Final name of a column renamed from `current` to `wanted`.
///
/// A leading `$` is reserved and stripped, an empty name becomes `column_N`
/// and a name taken by another column gets a `_N` suffix.
pub fn generate_column_name<'a>(
    columns: impl IntoIterator<Item = &'a str> + Clone,
    current: &str,
    wanted: &str,
) -> String {
    let wanted = wanted.trim_start_matches('$');
    if wanted.is_empty() {
        return next_suffixed_name("column", columns);
    }
    if wanted != current && columns.clone().into_iter().any(|name| name == wanted) {
        return next_suffixed_name(wanted, columns);
    }
    wanted.to_owned()
}

/// `column_N` for blank columns, N one past the largest `column_\d+` in use.
pub fn next_blank_column_number<'a>(columns: impl IntoIterator<Item = &'a str>) -> usize {
    columns
        .into_iter()
        .filter_map(|name| name.strip_prefix("column_"))
        .filter_map(|rest| rest.parse::<usize>().ok())
        .map(|n| n + 1)
        .max()
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_suffixed_name() {
        assert_eq!(next_suffixed_name("qty", ["name", "qty"]), "qty_1");
        assert_eq!(next_suffixed_name("qty", ["qty", "qty_1", "qty_7"]), "qty_8");
    }

    #[test]
    fn test_duplicate_name_strips_suffix() {
        assert_eq!(duplicate_name("qty_2", ["qty", "qty_2"]), "qty_3");
        assert_eq!(duplicate_name("name", ["name"]), "name_1");
    }

    #[test]
    fn test_generate_column_name() {
        let columns = ["name", "qty", "column_3"];
        assert_eq!(generate_column_name(columns, "qty", "$price"), "price");
        assert_eq!(generate_column_name(columns, "qty", ""), "column_4");
        assert_eq!(generate_column_name(columns, "qty", "name"), "name_1");
        assert_eq!(generate_column_name(columns, "qty", "qty"), "qty");
    }

    #[test]
    fn test_blank_column_number() {
        assert_eq!(next_blank_column_number(["a", "b"]), 1);
        assert_eq!(next_blank_column_number(["column_2", "column_x", "column_10"]), 11);
    }
}
