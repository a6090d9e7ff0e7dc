use super::table::Table;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Params};
use std::path::Path;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Double-quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Opens a cache database read-only, with `REGEXP` available.
pub fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    register_regexp(&conn)?;
    Ok(conn)
}

/// `x REGEXP pattern`. NULL on either side yields NULL; the compiled
/// pattern is cached per statement.
pub fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            if matches!(ctx.get_raw(0), ValueRef::Null) {
                return Ok(None);
            }
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            Ok(value_ref_text(ctx.get_raw(1)).map(|text| re.is_match(&text)))
        },
    )
}

fn value_ref_text(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Null => None,
        other => Some(value_to_text(other)),
    }
}

/// Renders any SQLite value as text; NULL becomes the empty string.
pub fn value_to_text(v: ValueRef<'_>) -> String {
    match v {
        ValueRef::Null => String::new(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// Runs a query and collects every row as text.
pub fn query_table<P: Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<Table> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query(params)?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(value_to_text(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(Table { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regexp_matches_and_propagates_null() {
        let conn = Connection::open_in_memory().unwrap();
        register_regexp(&conn).unwrap();
        let hit: bool = conn
            .query_row("SELECT '123' REGEXP '^[0-9]+$'", [], |r| r.get(0))
            .unwrap();
        let miss: bool = conn
            .query_row("SELECT '12a' REGEXP '^[0-9]+$'", [], |r| r.get(0))
            .unwrap();
        let null: Option<bool> = conn
            .query_row("SELECT NULL REGEXP '^[0-9]+$'", [], |r| r.get(0))
            .unwrap();
        assert!(hit);
        assert!(!miss);
        assert_eq!(null, None);
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("A\"B"), "\"A\"\"B\"");
    }

    #[test]
    fn query_table_renders_text() {
        let conn = Connection::open_in_memory().unwrap();
        let t = query_table(&conn, "SELECT 1 AS n, NULL AS z, 'x' AS s", []).unwrap();
        assert_eq!(t.columns, vec!["n", "z", "s"]);
        assert_eq!(t.rows, vec![vec!["1".to_string(), String::new(), "x".into()]]);
    }
}
