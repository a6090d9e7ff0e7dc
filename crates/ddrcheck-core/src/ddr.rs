//! Data dictionary (DDR) import.
//!
//! A DDR is a workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`) or a folder of
//! delimited sheet exports, one sheet per file, listing field names and
//! their declared formats (`VARCHAR2(20)`, `NUMBER(10,2)`, ...). The scope's
//! `ddr.yaml` says where those columns are and how formats map to
//! `structure.yaml` types.

use crate::config::{load_yaml, DDR_FILE};
use crate::errors::ConfigError;
use crate::model::{parse_flag, FieldDef, FieldType, Structure};
use crate::scope::ScopeStore;
use anyhow::Context;
use calamine::{open_workbook_auto, Reader, Sheets};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const SHEET_DATE_SUFFIXES: [&str; 2] = ["_AAAAMMDD", "_AAMMDD"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdrConfig {
    /// 0-based index of the first field row.
    #[serde(default)]
    pub first_line: usize,
    pub field_column: usize,
    pub format_column: usize,
    #[serde(default)]
    pub pk_column: Option<usize>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_sheets")]
    pub sheets: Vec<String>,
    pub formats: Vec<FormatRule>,
}

fn default_delimiter() -> String {
    ",".into()
}

fn default_sheets() -> Vec<String> {
    vec!["*".into()]
}

/// `pattern` is matched case-insensitively at the start of the format;
/// `size` and `precision` may reference its groups as `\1`, `\2`, ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRule {
    pub pattern: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub precision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub field_type: FieldType,
    pub size: Option<u32>,
    pub precision: Option<u32>,
}

struct CompiledRule {
    anchored: Regex,
    search: Regex,
    field_type: FieldType,
    size: Option<String>,
    precision: Option<String>,
}

pub struct FormatResolver {
    rules: Vec<CompiledRule>,
}

impl FormatResolver {
    pub fn new(rules: &[FormatRule]) -> Result<Self, ConfigError> {
        let compile = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError(format!("invalid format pattern '{}': {}", p, e)))
        };
        let rules = rules
            .iter()
            .map(|r| -> Result<CompiledRule, ConfigError> {
                Ok(CompiledRule {
                    anchored: compile(&format!("^(?:{})", r.pattern))?,
                    search: compile(&r.pattern)?,
                    field_type: FieldType::from(r.field_type.clone()),
                    size: r.size.as_deref().map(to_template),
                    precision: r.precision.as_deref().map(to_template),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// First rule whose pattern matches `format`; `None` if no rule does.
    pub fn resolve(&self, format: &str) -> Result<Option<ResolvedFormat>, ConfigError> {
        let format = format.trim();
        let Some(rule) = self.rules.iter().find(|r| r.anchored.is_match(format)) else {
            return Ok(None);
        };
        let expand = |template: &Option<String>| -> Result<Option<u32>, ConfigError> {
            let Some(t) = template else {
                return Ok(None);
            };
            let value = rule.search.replace_all(format, t.as_str());
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }
            value.parse::<u32>().map(Some).map_err(|_| {
                ConfigError(format!("format '{}' gives non-numeric size '{}'", format, value))
            })
        };
        Ok(Some(ResolvedFormat {
            field_type: rule.field_type.clone(),
            size: expand(&rule.size)?,
            precision: expand(&rule.precision)?,
        }))
    }
}

/// `\1` -> `${1}`.
fn to_template(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            let mut group = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                group.push(d);
                chars.next();
            }
            out.push_str(&format!("${{{}}}", group));
        } else if c == '$' {
            out.push_str("$$");
        } else {
            out.push(c);
        }
    }
    out
}

/// `CUSTOMERS_AAAAMMDD` -> `CUSTOMERS`.
pub fn sheet_name(stem: &str) -> String {
    SHEET_DATE_SUFFIXES
        .iter()
        .fold(stem.to_string(), |name, suffix| name.replace(suffix, ""))
}

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub written: Vec<(String, usize)>,
    pub skipped_sheets: Vec<String>,
    pub unknown_formats: Vec<(String, String, String)>,
}

pub fn load_ddr_config(store: &ScopeStore, scope: &str) -> Result<DdrConfig, ConfigError> {
    load_yaml(&store.scope_dir(scope).join(DDR_FILE))
}

/// Turns every matching sheet of `source` (a workbook or a folder of
/// delimited exports) into `<scope>/<version>/<sheet>/structure.yaml`.
pub fn import_sheets(
    store: &ScopeStore,
    scope: &str,
    version: &str,
    source: &Path,
) -> anyhow::Result<ImportSummary> {
    let cfg = load_ddr_config(store, scope)?;
    let resolver = FormatResolver::new(&cfg.formats)?;
    let patterns = cfg
        .sheets
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| ConfigError(format!("bad sheet pattern '{}': {}", p, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut book = SheetBook::open(source, &cfg)?;
    let mut summary = ImportSummary::default();
    for raw in book.names() {
        let name = sheet_name(&raw);
        if !patterns.iter().any(|p| p.matches(&name)) {
            summary.skipped_sheets.push(raw);
            continue;
        }

        let rows = book.rows(&raw)?;
        let fields = read_fields(&rows, &name, &cfg, &resolver, &mut summary)?;
        let count = fields.len();
        let structure = Structure::from_fields(fields)
            .with_context(|| format!("sheet {} does not define a valid structure", raw))?;
        store.save_structure(scope, version, &name, &structure)?;
        tracing::info!(event = "ddr_sheet_imported", sheet = %name, fields = count);
        summary.written.push((name, count));
    }
    Ok(summary)
}

enum SheetBook {
    /// Sheet name (file stem) and path, sorted by path.
    Delimited {
        files: Vec<(String, PathBuf)>,
        delimiter: u8,
    },
    Workbook {
        path: PathBuf,
        book: Sheets<BufReader<File>>,
    },
}

impl SheetBook {
    fn open(source: &Path, cfg: &DdrConfig) -> anyhow::Result<Self> {
        if !source.is_dir() {
            let book = open_workbook_auto(source)
                .with_context(|| format!("failed to open workbook {}", source.display()))?;
            return Ok(SheetBook::Workbook {
                path: source.to_path_buf(),
                book,
            });
        }

        let delimiter = match cfg.delimiter.as_bytes() {
            [b] => *b,
            _ => anyhow::bail!("ddr delimiter must be a single byte, got {:?}", cfg.delimiter),
        };
        let mut paths: Vec<PathBuf> = std::fs::read_dir(source)
            .with_context(|| format!("failed to list {}", source.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        let files = paths
            .into_iter()
            .map(|p| {
                let stem = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (stem, p)
            })
            .collect();
        Ok(SheetBook::Delimited { files, delimiter })
    }

    /// Sheet names in workbook (or path) order.
    fn names(&self) -> Vec<String> {
        match self {
            SheetBook::Delimited { files, .. } => files.iter().map(|(n, _)| n.clone()).collect(),
            SheetBook::Workbook { book, .. } => book.sheet_names(),
        }
    }

    /// Cell text, trimmed, addressed from A1.
    fn rows(&mut self, sheet: &str) -> anyhow::Result<Vec<Vec<String>>> {
        match self {
            SheetBook::Delimited { files, delimiter } => {
                let path = files
                    .iter()
                    .find(|(n, _)| n == sheet)
                    .map(|(_, p)| p.clone())
                    .with_context(|| format!("no sheet named {}", sheet))?;
                read_delimited(&path, *delimiter)
            }
            SheetBook::Workbook { path, book } => {
                let range = book.worksheet_range(sheet).with_context(|| {
                    format!("failed to read sheet {} of {}", sheet, path.display())
                })?;
                let (row0, col0) = range.start().unwrap_or((0, 0));
                let mut rows = vec![Vec::new(); row0 as usize];
                for cells in range.rows() {
                    let mut row = vec![String::new(); col0 as usize];
                    row.extend(cells.iter().map(|c| c.to_string().trim().to_string()));
                    rows.push(row);
                }
                Ok(rows)
            }
        }
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> anyhow::Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        rows.push(
            record
                .iter()
                .map(|b| String::from_utf8_lossy(b).trim().to_string())
                .collect(),
        );
    }
    Ok(rows)
}

fn read_fields(
    rows: &[Vec<String>],
    name: &str,
    cfg: &DdrConfig,
    resolver: &FormatResolver,
    summary: &mut ImportSummary,
) -> anyhow::Result<Vec<FieldDef>> {
    let mut fields = Vec::new();
    for row in rows.iter().skip(cfg.first_line) {
        let cell = |col: usize| row.get(col).cloned().unwrap_or_default();
        let field = cell(cfg.field_column);
        if field.is_empty() {
            continue;
        }
        let format = cell(cfg.format_column);
        let mut def = match resolver.resolve(&format)? {
            Some(r) => FieldDef {
                name: field.clone(),
                field_type: r.field_type,
                size: r.size,
                precision: r.precision,
                pk: false,
            },
            None => {
                tracing::warn!(
                    event = "ddr_unknown_format",
                    sheet = name,
                    field = %field,
                    format = %format,
                    "format matches no rule"
                );
                summary
                    .unknown_formats
                    .push((name.to_string(), field.clone(), format.clone()));
                FieldDef::new(&field, FieldType::from(format), None)
            }
        };
        def.pk = cfg.pk_column.map(|c| parse_flag(&cell(c))).unwrap_or(false);
        fields.push(def);
    }
    Ok(fields)
}
