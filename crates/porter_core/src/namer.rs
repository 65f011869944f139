//! Destination-name collision resolution
//!
//! Pure string logic over an already-captured directory listing; never
//! touches the file system.

use std::collections::HashSet;

/// Largest suffix number that still gets incremented. Matches the original
/// naming scheme's small-integer ceiling (2^30); at or above it the name
/// gains a literal " copy" suffix instead of a larger number.
pub const MAX_NAME_NUMBER: u64 = 1 << 30;

/// Resolve a non-conflicting name for `candidate` inside a directory whose
/// children are `existing`.
///
/// With `allow_overwrite` (or an empty directory) the candidate is returned
/// unchanged; otherwise " copy"-style suffixes are applied until the name is
/// free.
pub fn resolve_target_name(
    existing: &HashSet<String>,
    candidate: &str,
    is_directory: bool,
    allow_overwrite: bool,
) -> String {
    if allow_overwrite || existing.is_empty() {
        return candidate.to_string();
    }

    let mut name = candidate.to_string();
    while existing.contains(&name) {
        name = increment_name(&name, is_directory);
    }
    name
}

/// Produce the next name in the " copy" sequence:
/// `report.txt` -> `report copy.txt` -> `report copy 2.txt` -> ...
///
/// Two long-standing quirks of the sequence are kept for compatibility:
/// a trailing number of exactly 0 drops back to `<base> copy<ext>`, and a
/// number at [`MAX_NAME_NUMBER`] stops incrementing and appends a literal
/// " copy" instead.
pub fn increment_name(name: &str, is_directory: bool) -> String {
    let (stem, ext) = split_stem_extension(name, is_directory);

    match parse_copy_suffix(stem) {
        None => format!("{} copy{}", stem, ext),
        Some((base, None)) => format!("{} copy 2{}", base, ext),
        Some((base, Some(0))) => format!("{} copy{}", base, ext),
        Some((_, Some(n))) if n >= MAX_NAME_NUMBER => format!("{} copy{}", stem, ext),
        Some((base, Some(n))) => format!("{} copy {}{}", base, n + 1, ext),
    }
}

/// Split into stem and extension (extension starts at the last dot, empty if
/// none). Directories never have an extension.
fn split_stem_extension(name: &str, is_directory: bool) -> (&str, &str) {
    if is_directory {
        return (name, "");
    }
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// Match a trailing `<base> copy` or `<base> copy <N>` suffix.
/// Returns `(base, None)` for the bare form, `(base, Some(N))` for the
/// numbered form. Numbers too large for u64 count as at-ceiling.
fn parse_copy_suffix(stem: &str) -> Option<(&str, Option<u64>)> {
    if let Some(base) = stem.strip_suffix(" copy") {
        return Some((base, None));
    }

    if let Some(idx) = stem.rfind(" copy ") {
        let digits = &stem[idx + " copy ".len()..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let n = digits.parse::<u64>().unwrap_or(u64::MAX);
            return Some((&stem[..idx], Some(n)));
        }
    }

    None
}
