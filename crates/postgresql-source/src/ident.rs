//! SQL identifier checks.
//!
//! Table and column names come from configuration and end up inside SQL
//! text, so they are restricted to plain identifiers and always quoted.

use anyhow::{bail, Result};

/// Accept `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes (PostgreSQL's limit).
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("Identifier must not be empty");
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        bail!("Invalid identifier '{name}': must start with a letter or underscore");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid identifier '{name}': only letters, digits and underscores are allowed");
    }
    if name.len() > 63 {
        bail!("Invalid identifier '{name}': longer than 63 bytes");
    }
    Ok(())
}

/// Quote an optionally schema-qualified name: `public.orders` becomes
/// `"public"."orders"`.
pub fn quote_qualified(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        bail!("Invalid table name '{name}': expected 'table' or 'schema.table'");
    }
    let mut quoted = Vec::with_capacity(parts.len());
    for part in parts {
        validate_identifier(part)?;
        quoted.push(format!("\"{part}\""));
    }
    Ok(quoted.join("."))
}

/// Split `schema.table` into its parts, defaulting the schema to `public`.
pub(crate) fn split_qualified(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => ("public", name),
    }
}
