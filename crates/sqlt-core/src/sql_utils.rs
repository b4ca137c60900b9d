//! SQL identifier quoting utilities
//!
//! Used by backend helpers that build metadata queries from table names a
//! template author supplied.

/// Quote a SQL identifier to prevent injection.
///
/// Wraps the identifier in double quotes and escapes any embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use sqlt_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("sales"), r#""sales""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an identifier with backticks, as Hive and Spark expect.
pub fn quote_ident_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Split a possibly schema-qualified table name into `(schema, table)`.
///
/// Uses the last `.` as the separator. Returns `None` for the schema when the
/// name is unqualified so the caller can fall back to its own context.
///
/// # Examples
/// ```
/// use sqlt_core::sql_utils::split_table_name;
/// assert_eq!(split_table_name("sales"), (None, "sales"));
/// assert_eq!(split_table_name("web.sales"), (Some("web"), "sales"));
/// ```
pub fn split_table_name(name: &str) -> (Option<&str>, &str) {
    match name.rfind('.') {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}
