use crate::kinds;
use crate::sql::{collect, text};
use ddrcheck_core::cancel::CancellationToken;
use ddrcheck_core::model::ErrorMap;
use ddrcheck_core::storage::loader::DATA_TABLE;
use ddrcheck_core::storage::sqlite::quote_ident;
use ddrcheck_core::storage::ExtractorFile;
use ddrcheck_core::validators_api::{Validation, Validator};
use std::sync::Arc;

/// Primary key fields must be informed and unique as a tuple.
pub struct PkValidator;

pub fn validator() -> Arc<dyn Validator> {
    Arc::new(PkValidator)
}

impl Validator for PkValidator {
    fn name(&self) -> &'static str {
        "pk"
    }

    fn validate(
        &self,
        file: &ExtractorFile,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Validation> {
        let cfg = file.config()?;
        let pk: Vec<String> = cfg
            .structure
            .pk_fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        if pk.is_empty() {
            return Ok(Validation::ok());
        }

        let conn = file.open()?;
        let present = file.columns()?;
        let mut errors = ErrorMap::new();

        let missing: Vec<&String> = pk.iter().filter(|f| !present.contains(f)).collect();
        if !missing.is_empty() {
            for f in missing {
                errors.push(f, kinds::COLUMN_MISSING, None, None);
            }
            return Ok(Validation::Completed(errors));
        }

        for field in &pk {
            if cancel.is_cancelled() {
                return Ok(Validation::Aborted);
            }
            let col = quote_ident(field);
            let sql = format!(
                "SELECT LINE_NUMBER, {col} FROM {table} WHERE TRIM({v}) = '' ORDER BY LINE_NUMBER",
                col = col,
                table = DATA_TABLE,
                v = text(&col)
            );
            if collect(&conn, &sql, field, kinds::PK_NOT_INFORMED, &mut errors, cancel)?.is_break()
            {
                return Ok(Validation::Aborted);
            }
        }

        if cancel.is_cancelled() {
            return Ok(Validation::Aborted);
        }
        let cols: Vec<String> = pk.iter().map(|f| quote_ident(f)).collect();
        let partition: Vec<String> = cols.iter().map(|c| text(c)).collect();
        let sql = format!(
            "SELECT LINE_NUMBER, {cols} FROM (
                SELECT LINE_NUMBER, {cols},
                       COUNT(*) OVER (PARTITION BY {partition}) AS dup_count
                FROM {table}
             ) WHERE dup_count > 1 ORDER BY LINE_NUMBER",
            cols = cols.join(", "),
            partition = partition.join(", "),
            table = DATA_TABLE
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if cancel.is_cancelled() {
                return Ok(Validation::Aborted);
            }
            let line: i64 = row.get(0)?;
            let mut parts = Vec::with_capacity(pk.len());
            for (i, name) in pk.iter().enumerate() {
                let value: Option<String> = row.get(i + 1)?;
                parts.push(format!("{}={}", name, value.unwrap_or_default()));
            }
            errors.push(
                kinds::PK_FIELD,
                kinds::PK_DUPLICATED,
                Some(line),
                Some(format!("PK duplicated: {}", parts.join(", "))),
            );
        }

        tracing::debug!(
            event = "pk_checked",
            file = %file.name(),
            keys = pk.len(),
            violations = errors.total(),
        );
        Ok(Validation::Completed(errors))
    }
}
