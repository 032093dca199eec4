//! Structured parsing of schema strings
//!
//! A schema string is the body of a `CREATE TABLE` statement, e.g.
//! `id INTEGER PRIMARY KEY, name TEXT NOT NULL DEFAULT 'x, y', FOREIGN KEY
//! (guild) REFERENCES guilds(id)`. Clauses are split on top-level commas only:
//! commas inside parentheses or quoted text never split a clause.

use crate::types::{ColumnDefinition, SchemaClause, TableConstraintKind};

/// Keywords that end a column's type name
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
    "AUTOINCREMENT",
];

/// Split a schema string on commas that sit outside parentheses and quotes
///
/// Empty clauses are dropped and each clause is trimmed.
///
/// # Examples
///
/// ```
/// use cipherstore_domain::split_top_level;
///
/// let parts = split_top_level("a DECIMAL(10, 2), b TEXT DEFAULT 'x,y'");
/// assert_eq!(parts, vec!["a DECIMAL(10, 2)", "b TEXT DEFAULT 'x,y'"]);
/// ```
pub fn split_top_level(schema: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;

    for ch in schema.chars() {
        match quote {
            Some(open) => {
                current.push(ch);
                if ch == closing_quote(open) {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' | '[' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    push_trimmed(&mut parts, &current);
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    push_trimmed(&mut parts, &current);
    parts
}

fn closing_quote(open: char) -> char {
    if open == '[' {
        ']'
    } else {
        open
    }
}

fn push_trimmed(parts: &mut Vec<String>, clause: &str) {
    let trimmed = clause.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
}

/// Parse a schema string into tagged clauses
pub fn parse_schema(schema: &str) -> Vec<SchemaClause> {
    split_top_level(schema).iter().filter_map(|clause| parse_clause(clause)).collect()
}

/// Classify one clause as a column or a table constraint
///
/// Returns `None` for a clause with no column name.
pub fn parse_clause(clause: &str) -> Option<SchemaClause> {
    let tokens = tokenize(clause);
    let first = tokens.first()?.to_uppercase();

    // CONSTRAINT <name> <constraint>
    let head = if first == "CONSTRAINT" {
        tokens.get(2).map(|t| t.to_uppercase()).unwrap_or_default()
    } else {
        first
    };
    let head = head.split('(').next().unwrap_or_default().to_string();
    let next = |i: usize| tokens.get(i).map(|t| t.to_uppercase()).unwrap_or_default();
    let offset = if tokens.first().map(|t| t.eq_ignore_ascii_case("CONSTRAINT")) == Some(true) {
        3
    } else {
        1
    };

    let kind = match head.as_str() {
        "PRIMARY" if next(offset).starts_with("KEY") => Some(TableConstraintKind::PrimaryKey),
        "FOREIGN" if next(offset).starts_with("KEY") => Some(TableConstraintKind::ForeignKey),
        "UNIQUE" => Some(TableConstraintKind::Unique),
        "CHECK" => Some(TableConstraintKind::Check),
        _ if offset == 3 => Some(TableConstraintKind::Other),
        _ => None,
    };

    match kind {
        Some(kind) => Some(SchemaClause::TableConstraint { kind, sql: clause.trim().to_string() }),
        None => parse_column_definition(clause).map(SchemaClause::Column),
    }
}

/// Parse a single column clause
///
/// # Examples
///
/// ```
/// use cipherstore_domain::parse_column_definition;
///
/// let column = parse_column_definition("gold INTEGER NOT NULL DEFAULT 0").unwrap();
/// assert_eq!(column.name, "gold");
/// assert_eq!(column.data_type, "INTEGER");
/// assert!(!column.nullable);
/// assert_eq!(column.default_value.as_deref(), Some("0"));
/// ```
pub fn parse_column_definition(clause: &str) -> Option<ColumnDefinition> {
    let tokens = tokenize(clause);
    let name = unquote(tokens.first()?);
    if name.is_empty() {
        return None;
    }

    let mut index = 1;
    let mut type_parts = Vec::new();
    while let Some(token) = tokens.get(index) {
        if is_constraint_keyword(token) {
            break;
        }
        type_parts.push(token.as_str());
        index += 1;
    }

    let mut column = ColumnDefinition {
        name,
        data_type: type_parts.join(" "),
        nullable: true,
        default_value: None,
        is_primary_key: false,
        constraints: Vec::new(),
    };

    while let Some(token) = tokens.get(index) {
        let upper = token.to_uppercase();
        match upper.as_str() {
            "NOT" if upper_at(&tokens, index + 1) == "NULL" => {
                column.nullable = false;
                index += 2;
            }
            "NULL" => index += 1,
            "PRIMARY" if upper_at(&tokens, index + 1) == "KEY" => {
                column.is_primary_key = true;
                index += 2;
                // ASC / DESC / AUTOINCREMENT stay attached to the key
                let mut suffix = vec!["PRIMARY KEY".to_string()];
                while let Some(modifier) = tokens.get(index) {
                    let upper = modifier.to_uppercase();
                    if matches!(upper.as_str(), "ASC" | "DESC" | "AUTOINCREMENT") {
                        suffix.push(modifier.clone());
                        index += 1;
                    } else {
                        break;
                    }
                }
                column.constraints.push(suffix.join(" "));
            }
            "DEFAULT" => {
                column.default_value = tokens.get(index + 1).cloned();
                index += 2;
            }
            _ => {
                // Collect this constraint up to the next keyword
                let mut parts = vec![token.clone()];
                index += 1;
                while let Some(more) = tokens.get(index) {
                    if is_constraint_keyword(more) {
                        break;
                    }
                    parts.push(more.clone());
                    index += 1;
                }
                column.constraints.push(parts.join(" "));
            }
        }
    }

    Some(column)
}

fn upper_at(tokens: &[String], index: usize) -> String {
    tokens.get(index).map(|t| t.to_uppercase()).unwrap_or_default()
}

fn is_constraint_keyword(token: &str) -> bool {
    let word = token.split('(').next().unwrap_or_default().to_uppercase();
    CONSTRAINT_KEYWORDS.contains(&word.as_str())
}

fn unquote(token: &str) -> String {
    let trimmed = token.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), trimmed.chars().last()) {
        (Some(open @ ('"' | '`' | '[')), Some(close))
            if trimmed.len() >= 2 && close == closing_quote(open) =>
        {
            trimmed[1..trimmed.len() - 1].to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Split a clause into whitespace-separated tokens, keeping quoted text and
/// parenthesised groups attached to the token they start in
fn tokenize(clause: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;

    for ch in clause.chars() {
        match quote {
            Some(open) => {
                current.push(ch);
                if ch == closing_quote(open) {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' | '[' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                c if c.is_whitespace() && depth == 0 => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    //! Unit tests for utils::schema_parser.
    use super::*;

    /// Validates splitting ignores commas inside parentheses and quotes.
    #[test]
    fn test_split_respects_nesting() {
        let parts = split_top_level(
            "id INTEGER, price DECIMAL(10,2), note TEXT DEFAULT 'a, b', \
             FOREIGN KEY (owner, slot) REFERENCES owners(id, slot),",
        );

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], "price DECIMAL(10,2)");
        assert_eq!(parts[2], "note TEXT DEFAULT 'a, b'");
        assert!(parts[3].starts_with("FOREIGN KEY (owner, slot)"));
    }

    /// Validates clause classification.
    ///
    /// Assertions:
    /// - Confirms table-level FOREIGN KEY, PRIMARY KEY, UNIQUE and CHECK are
    ///   tagged as constraints.
    /// - Confirms a column whose name starts with `check` stays a column.
    #[test]
    fn test_parse_schema_tags_clauses() {
        let clauses = parse_schema(
            "id INTEGER PRIMARY KEY AUTOINCREMENT, checksum TEXT, \
             PRIMARY KEY (id), UNIQUE(checksum), CHECK (id > 0), \
             CONSTRAINT fk_guild FOREIGN KEY (guild_id) REFERENCES guilds(id)",
        );

        assert_eq!(clauses.len(), 6);
        assert!(matches!(&clauses[1], SchemaClause::Column(c) if c.name == "checksum"));
        assert!(matches!(
            clauses[2],
            SchemaClause::TableConstraint { kind: TableConstraintKind::PrimaryKey, .. }
        ));
        assert!(matches!(
            clauses[3],
            SchemaClause::TableConstraint { kind: TableConstraintKind::Unique, .. }
        ));
        assert!(matches!(
            clauses[4],
            SchemaClause::TableConstraint { kind: TableConstraintKind::Check, .. }
        ));
        assert!(clauses[5].is_foreign_key());
    }

    /// Validates column details.
    #[test]
    fn test_parse_column_definition() {
        let column = parse_column_definition("id INTEGER PRIMARY KEY AUTOINCREMENT").unwrap();
        assert!(column.is_primary_key);
        assert_eq!(column.constraints, vec!["PRIMARY KEY AUTOINCREMENT"]);

        let column =
            parse_column_definition("\"display name\" VARCHAR(32) NOT NULL DEFAULT 'x y' UNIQUE")
                .unwrap();
        assert_eq!(column.name, "display name");
        assert_eq!(column.data_type, "VARCHAR(32)");
        assert!(!column.nullable);
        assert_eq!(column.default_value.as_deref(), Some("'x y'"));
        assert_eq!(column.constraints, vec!["UNIQUE"]);

        let column = parse_column_definition("level INTEGER CHECK(level > 0)").unwrap();
        assert_eq!(column.data_type, "INTEGER");
        assert_eq!(column.constraints, vec!["CHECK(level > 0)"]);

        let column = parse_column_definition("big UNSIGNED BIG INT").unwrap();
        assert_eq!(column.data_type, "UNSIGNED BIG INT");

        let column = parse_column_definition("guild_id INTEGER REFERENCES guilds(id)").unwrap();
        assert_eq!(column.constraints, vec!["REFERENCES guilds(id)"]);
    }

    /// Validates a column with no declared type.
    #[test]
    fn test_parse_untyped_column() {
        let column = parse_column_definition("payload").unwrap();
        assert_eq!(column.data_type, "");
        assert!(column.nullable);
        assert!(parse_column_definition("   ").is_none());
    }
}
