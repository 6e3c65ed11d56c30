use std::path::PathBuf;

/// Well-known locations under the platform data directory.
#[derive(Debug, Clone)]
pub struct StandardPaths {
    pub base_dir: PathBuf,
    pub logs_dir: PathBuf,
}

/// Resolves the eruo data directories.
///
/// `ERUO_HOME` overrides the base directory, which keeps tests away from the
/// user's real configuration.
pub fn standard_paths() -> StandardPaths {
    let base_dir = std::env::var_os("ERUO_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|dir| dir.join("eruo")))
        .unwrap_or_else(|| PathBuf::from(".eruo"));
    StandardPaths {
        logs_dir: base_dir.join("logs"),
        base_dir,
    }
}

/// Builds `"<base> N"` where N is one more than the highest number already used
/// after the same base. A trailing ` N` on `name` is stripped first.
pub fn next_numbered_name<'a>(name: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let base = strip_number_suffix(name);
    let pattern = format!(r"^{}\s+(\d+)$", regex::escape(base));
    let mut number = 1;
    if let Ok(re) = regex::Regex::new(&pattern) {
        for candidate in existing {
            if let Some(n) = re
                .captures(candidate)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok())
            {
                number = number.max(n + 1);
            }
        }
    }
    format!("{base} {number}")
}

fn strip_number_suffix(name: &str) -> &str {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() < name.len() && trimmed.ends_with(char::is_whitespace) {
        trimmed.trim_end()
    } else {
        name
    }
}

/// Interprets a loosely written boolean.
pub fn cast_to_boolean(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Formats a byte count the way file listings show it.
pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let suffix = UNITS.get(unit).copied().unwrap_or("B");
    if unit == 0 {
        format!("{bytes} {suffix}")
    } else {
        format!("{size:.1} {suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_to_boolean() {
        assert_eq!(cast_to_boolean("TRUE"), Some(true));
        assert_eq!(cast_to_boolean(" 0 "), Some(false));
        assert_eq!(cast_to_boolean("maybe"), None);
    }

    #[test]
    fn test_next_numbered_name() {
        assert_eq!(next_numbered_name("Sheet", ["Other"]), "Sheet 1");
        assert_eq!(next_numbered_name("Sheet 1", ["Sheet 1", "Sheet 4"]), "Sheet 5");
        assert_eq!(next_numbered_name("Sales (2024)", ["Sales (2024) 2"]), "Sales (2024) 3");
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
    }
}
