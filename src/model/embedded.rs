//! Helpers for dotted embedded-path column names.
//!
//! A column such as `address.city.name` denotes the `name` property of a value
//! object nested two levels deep; non-relational backends may need one
//! physical hop per segment to resolve it.

pub const SEPARATOR: char = '.';

/// True if the column denotes a property of an embedded value.
pub fn is_part_of_embedded(column: &str) -> bool {
    column.contains(SEPARATOR)
}

/// Splits a dotted path into its segments.
pub fn split(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).collect()
}

/// Returns the last segment of a dotted path.
pub fn leaf(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Strips `prefix.` from `path`, returning `path` unchanged when it is not
/// nested below `prefix`.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return path;
    }
    path.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .unwrap_or(path)
}
