//! Field-to-column name mapping

use convert_case::{Boundary, Case, Casing};

/// Word boundaries for column names. Digits stay attached to the word before them.
const COLUMN_BOUNDARIES: [Boundary; 6] = [
    Boundary::Underscore,
    Boundary::Hyphen,
    Boundary::Space,
    Boundary::LowerUpper,
    Boundary::DigitUpper,
    Boundary::Acronym,
];

/// Map a field name to its storage column name (`deptName` -> `dept_name`,
/// `addr2Line` -> `addr2_line`).
///
/// Also used by the derive macros' generated code for default column and
/// table names.
pub fn to_column_name(field: &str) -> String {
    field.with_boundaries(&COLUMN_BOUNDARIES).to_case(Case::Snake)
}

/// Whether `name` can be spliced into SQL as an identifier.
///
/// Accepts `column` and `qualifier.column`, each part made of ASCII
/// alphanumerics and underscores and not starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
