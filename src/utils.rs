//! Master index cell parsing helpers.

/// Parse a boolean cell as written by common tabular tools (`True`, `false`, `1`, `no`, empty).
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Treat empty and pandas-style missing cells as absent.
pub fn non_empty_cell(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    match trimmed {
        "" => None,
        value if value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("none") => None,
        value => Some(value),
    }
}
