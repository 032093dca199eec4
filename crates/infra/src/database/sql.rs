//! SQL text helpers shared by the engines.
//!
//! SQLite cannot bind identifiers, so table and column names are spliced
//! into statements through [`quote_ident`].

use cipherstore_domain::constants::{ANDROID_METADATA_TABLE, SYSTEM_TABLE_PREFIX};

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?, ?, ?` with `count` placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Whether `table` is engine-owned rather than user data
pub fn is_system_table(table: &str) -> bool {
    table.starts_with(SYSTEM_TABLE_PREFIX) || table == ANDROID_METADATA_TABLE
}

/// ` WHERE <clause>` or nothing for an empty clause
pub fn where_suffix(where_clause: &str) -> String {
    let trimmed = where_clause.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" WHERE {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for database::sql.
    use super::*;

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("players"), "\"players\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn helpers_render_fragments() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
        assert_eq!(where_suffix("  "), "");
        assert_eq!(where_suffix("id = ?"), " WHERE id = ?");
        assert!(is_system_table("sqlite_sequence"));
        assert!(is_system_table("android_metadata"));
        assert!(!is_system_table("players"));
    }
}
