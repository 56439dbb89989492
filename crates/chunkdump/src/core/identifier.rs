//! Identifier escaping and quoting for generated SQL.
//!
//! Identifiers (database, table, partition and column names) cannot be bound as
//! statement parameters, so every place that interpolates one into SQL text goes
//! through this module. MySQL-family servers quote with backticks; an embedded
//! backtick is escaped by doubling it. No other escaping is applied.

use crate::error::{DumpError, Result};

/// Maximum identifier length accepted by MySQL-family servers.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier before it is used in generated SQL.
///
/// Rejects empty identifiers, identifiers containing null bytes and identifiers
/// longer than the server maximum.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DumpError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DumpError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(DumpError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Escape backticks inside an identifier without adding the surrounding quotes.
pub fn escape(name: &str) -> String {
    name.replace('`', "``")
}

/// Quote an identifier with backticks.
///
/// # Examples
///
/// ```
/// use chunkdump::core::identifier::quote;
/// assert_eq!(quote("users"), "`users`");
/// assert_eq!(quote("odd`name"), "`odd``name`");
/// ```
pub fn quote(name: &str) -> String {
    format!("`{}`", escape(name))
}

/// Quote a `database.table` pair.
pub fn qualify(database: &str, table: &str) -> String {
    format!("{}.{}", quote(database), quote(table))
}

/// Quote every name in `names`, preserving order.
pub fn quote_all<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| quote(n.as_ref())).collect()
}

/// Escape a value for inclusion inside a single-quoted SQL string literal.
pub fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("name"), "`name`");
        assert_eq!(quote("table`name"), "`table``name`");
        assert_eq!(quote("``"), "``````");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("test", "t1"), "`test`.`t1`");
        assert_eq!(qualify("te`st", "t`1"), "`te``st`.`t``1`");
    }

    #[test]
    fn test_quote_all() {
        assert_eq!(quote_all(&["a", "b`"]), vec!["`a`", "`b```"]);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(65)).is_err());
        assert!(validate_identifier(&"é".repeat(64)).is_ok());
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal("it's"), "it''s");
        assert_eq!(escape_string_literal("a\\b"), "a\\\\b");
        assert_eq!(escape_string_literal("line\nbreak"), "line\\nbreak");
    }
}
