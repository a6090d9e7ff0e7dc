use ddrcheck_core::cancel::CancellationToken;
use ddrcheck_core::model::ErrorMap;
use rusqlite::Connection;
use std::ops::ControlFlow;

/// Runs `sql` (selecting `LINE_NUMBER, value`) and records one violation per
/// row under `field` / `kind`. Breaks as soon as `cancel` fires.
pub(crate) fn collect(
    conn: &Connection,
    sql: &str,
    field: &str,
    kind: &str,
    errors: &mut ErrorMap,
    cancel: &CancellationToken,
) -> rusqlite::Result<ControlFlow<()>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if cancel.is_cancelled() {
            return Ok(ControlFlow::Break(()));
        }
        let line: i64 = row.get(0)?;
        let value: Option<String> = row.get(1)?;
        errors.push(field, kind, Some(line), value);
    }
    Ok(ControlFlow::Continue(()))
}

/// `COALESCE(col, '')`.
pub(crate) fn text(col: &str) -> String {
    format!("COALESCE({}, '')", col)
}
