//! Column type families and SQL literal rendering for boundary values.
//!
//! Boundary values come back from the server as raw text (or raw bytes for
//! binary columns) and are spliced into chunk predicates, so each value has to be
//! rendered as a literal that matches its column's declared type.

use serde::{Deserialize, Serialize};

use super::identifier::escape_string_literal;

/// Numeric type names (integer, fixed and floating point families).
const NUMERIC_TYPES: &[&str] = &[
    "INTEGER", "BIGINT", "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INT1", "INT2", "INT3", "INT8",
    "REAL", "DOUBLE", "FLOAT", "DECIMAL", "NUMERIC", "FIXED", "BOOL", "BOOLEAN",
];

/// Integer-only subset of [`NUMERIC_TYPES`].
const INTEGER_TYPES: &[&str] = &[
    "INTEGER", "BIGINT", "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INT1", "INT2", "INT3", "INT8",
];

/// Binary type names, rendered as hex literals.
const BINARY_TYPES: &[&str] = &[
    "BLOB", "TINYBLOB", "MEDIUMBLOB", "LONGBLOB", "LONG", "BINARY", "VARBINARY", "BIT", "GEOMETRY",
];

/// How a column's values are written as SQL literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    /// Bare numeral, e.g. `42`.
    Number,
    /// Quoted string, e.g. `'abc'`.
    String,
    /// Hex byte string, e.g. `x'0a0b'`.
    Bytes,
}

/// Normalize a declared type ("bigint unsigned", "varchar(20)") to its bare upper-case name.
fn base_type_name(type_name: &str) -> String {
    let trimmed = type_name.trim();
    let end = trimmed
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(trimmed.len());
    trimmed[..end].to_ascii_uppercase()
}

/// True when the type belongs to the numeric allow-list.
pub fn is_numeric_type(type_name: &str) -> bool {
    NUMERIC_TYPES.contains(&base_type_name(type_name).as_str())
}

/// True when the type is an integer type.
pub fn is_integer_type(type_name: &str) -> bool {
    INTEGER_TYPES.contains(&base_type_name(type_name).as_str())
}

impl TypeFamily {
    /// Classify a declared column type.
    pub fn of(type_name: &str) -> Self {
        let base = base_type_name(type_name);
        if NUMERIC_TYPES.contains(&base.as_str()) {
            TypeFamily::Number
        } else if BINARY_TYPES.contains(&base.as_str()) {
            TypeFamily::Bytes
        } else {
            TypeFamily::String
        }
    }

    /// Render raw cell bytes as a literal of this family.
    pub fn render(self, raw: &[u8]) -> String {
        match self {
            TypeFamily::Number => String::from_utf8_lossy(raw).into_owned(),
            TypeFamily::String => {
                format!("'{}'", escape_string_literal(&String::from_utf8_lossy(raw)))
            }
            TypeFamily::Bytes => format!("x'{}'", hex::encode(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_family_classification() {
        assert_eq!(TypeFamily::of("BIGINT"), TypeFamily::Number);
        assert_eq!(TypeFamily::of("bigint unsigned"), TypeFamily::Number);
        assert_eq!(TypeFamily::of("decimal(10,2)"), TypeFamily::Number);
        assert_eq!(TypeFamily::of("VARCHAR"), TypeFamily::String);
        assert_eq!(TypeFamily::of("datetime"), TypeFamily::String);
        assert_eq!(TypeFamily::of("varbinary(16)"), TypeFamily::Bytes);
        assert_eq!(TypeFamily::of("BIT"), TypeFamily::Bytes);
    }

    #[test]
    fn test_numeric_and_integer_allow_lists() {
        assert!(is_numeric_type("INT"));
        assert!(is_numeric_type("double"));
        assert!(!is_numeric_type("VARCHAR"));
        assert!(is_integer_type("int(11)"));
        assert!(!is_integer_type("DECIMAL"));
    }

    #[test]
    fn test_render_literals() {
        assert_eq!(TypeFamily::Number.render(b"960001"), "960001");
        assert_eq!(TypeFamily::String.render(b"O'Brien"), "'O''Brien'");
        assert_eq!(TypeFamily::Bytes.render(&[0x0a, 0xff]), "x'0aff'");
    }
}
