use crate::kinds;
use crate::sql::{collect, text};
use ddrcheck_core::cancel::CancellationToken;
use ddrcheck_core::model::{ErrorMap, FieldDef, FieldType};
use ddrcheck_core::storage::loader::DATA_TABLE;
use ddrcheck_core::storage::sqlite::quote_ident;
use ddrcheck_core::storage::ExtractorFile;
use ddrcheck_core::validators_api::{Validation, Validator};
use rusqlite::Connection;
use std::ops::ControlFlow;
use std::sync::Arc;

const INTEGER_RE: &str = "^-?[0-9]+$";
const DECIMAL_RE: &str = r"^-?[0-9]+(\.[0-9]+)?$";

/// Checks every declared field against its type, size and precision.
pub struct FormatValidator;

pub fn validator() -> Arc<dyn Validator> {
    Arc::new(FormatValidator)
}

impl Validator for FormatValidator {
    fn name(&self) -> &'static str {
        "format"
    }

    fn validate(
        &self,
        file: &ExtractorFile,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Validation> {
        let cfg = file.config()?;
        let conn = file.open()?;
        let present = file.columns()?;
        let skip_blank = cfg.metadata.nullable;

        let mut errors = ErrorMap::new();
        for field in cfg.structure.fields() {
            if cancel.is_cancelled() {
                return Ok(Validation::Aborted);
            }
            if !present.iter().any(|c| c == &field.name) {
                errors.push(&field.name, kinds::COLUMN_MISSING, None, None);
                continue;
            }
            let flow = check_field(&conn, field, skip_blank, &mut errors, cancel)?;
            if flow.is_break() {
                return Ok(Validation::Aborted);
            }
        }
        Ok(Validation::Completed(errors))
    }
}

struct Check {
    kind: &'static str,
    condition: String,
}

fn check_field(
    conn: &Connection,
    field: &FieldDef,
    skip_blank: bool,
    errors: &mut ErrorMap,
    cancel: &CancellationToken,
) -> rusqlite::Result<ControlFlow<()>> {
    let col = quote_ident(&field.name);
    let v = text(&col);
    let not_blank = format!("TRIM({}) <> ''", v);
    let with_blank_rule = |cond: String| {
        if skip_blank {
            format!("{} AND {}", not_blank, cond)
        } else {
            cond
        }
    };

    let checks: Vec<Check> = match field.field_type {
        FieldType::Varchar => match field.size {
            Some(n) => vec![Check {
                kind: kinds::LENGTH_EXCEEDED,
                condition: format!("LENGTH({}) > {}", v, n),
            }],
            None => Vec::new(),
        },
        FieldType::Integer => {
            let mut checks = vec![Check {
                kind: kinds::NOT_NUMERIC,
                condition: with_blank_rule(format!("NOT ({} REGEXP '{}')", v, INTEGER_RE)),
            }];
            if let Some(n) = field.size {
                checks.push(Check {
                    kind: kinds::LENGTH_EXCEEDED,
                    condition: format!(
                        "{v} REGEXP '{re}' AND LENGTH(LTRIM({v}, '-')) > {n}",
                        v = v,
                        re = INTEGER_RE,
                        n = n
                    ),
                });
            }
            checks
        }
        FieldType::Decimal => {
            let (Some(size), Some(precision)) = (field.size, field.precision) else {
                errors.push(&field.name, kinds::MISSING_SIZE, None, None);
                return Ok(ControlFlow::Continue(()));
            };
            let well_formed = format!("{} REGEXP '{}'", v, DECIMAL_RE);
            let int_part = format!(
                "LTRIM(CASE WHEN INSTR({v}, '.') > 0 THEN SUBSTR({v}, 1, INSTR({v}, '.') - 1) ELSE {v} END, '-')",
                v = v
            );
            vec![
                Check {
                    kind: kinds::NOT_DECIMAL,
                    condition: with_blank_rule(format!("NOT ({})", well_formed)),
                },
                Check {
                    kind: kinds::INTEGER_OVERFLOW,
                    condition: format!(
                        "{} AND LENGTH({}) > {}",
                        well_formed,
                        int_part,
                        size.saturating_sub(precision)
                    ),
                },
                Check {
                    kind: kinds::FRACTION_OVERFLOW,
                    condition: format!(
                        "{wf} AND INSTR({v}, '.') > 0 AND LENGTH({v}) - INSTR({v}, '.') > {p}",
                        wf = well_formed,
                        v = v,
                        p = precision
                    ),
                },
            ]
        }
        FieldType::Date | FieldType::Other(_) => Vec::new(),
    };

    for check in checks {
        if cancel.is_cancelled() {
            return Ok(ControlFlow::Break(()));
        }
        let sql = format!(
            "SELECT LINE_NUMBER, {col} FROM {table} WHERE {cond} ORDER BY LINE_NUMBER",
            col = col,
            table = DATA_TABLE,
            cond = check.condition
        );
        if collect(conn, &sql, &field.name, check.kind, errors, cancel)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}
