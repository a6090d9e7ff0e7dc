//! Source file parsing.
//!
//! Two readers are tried in order. The columnar reader (`csv` over raw bytes,
//! strict decoding, every record the same width) handles well-formed files.
//! The line reader accepts what the first one rejects: multi-character
//! separators or terminators, ragged rows and undecodable bytes.

use super::table::Table;
use crate::errors::{ConfigError, LoaderError};
use crate::model::LineTerminator;
use encoding_rs::Encoding;
use std::collections::HashSet;
use std::path::Path;

pub const LINE_NUMBER: &str = "LINE_NUMBER";

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub separator: String,
    pub terminator: LineTerminator,
    pub encoding: &'static Encoding,
    /// `None` means the first row is the header.
    pub column_names: Option<Vec<String>>,
}

pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ConfigError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ConfigError(format!("unknown encoding '{}'", label)))
}

/// Parses a whole source file into a [`Table`] with normalized column names.
pub fn parse_source(path: &Path, bytes: &[u8], opts: &ParseOptions) -> Result<Table, LoaderError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((enc, bom_len)) => (enc, &bytes[bom_len..]),
        None => (opts.encoding, bytes),
    };

    if is_blank(body, encoding) {
        return Err(LoaderError::Empty {
            path: path.to_path_buf(),
        });
    }

    let primary_err = match parse_columnar(body, encoding, opts) {
        Ok(table) => return Ok(table),
        Err(e) => e,
    };
    tracing::debug!(
        event = "parse_fallback",
        file = %path.display(),
        reason = %primary_err,
        "columnar reader failed, using line reader"
    );

    parse_lines(body, encoding, opts).map_err(|fallback_err| LoaderError::Format {
        path: path.to_path_buf(),
        message: format!(
            "columnar reader: {}; line reader: {}",
            primary_err, fallback_err
        ),
    })
}

fn is_blank(body: &[u8], encoding: &'static Encoding) -> bool {
    if encoding.is_ascii_compatible() {
        body.iter().all(u8::is_ascii_whitespace)
    } else {
        let (text, _) = encoding.decode_without_bom_handling(body);
        text.trim().is_empty()
    }
}

fn parse_columnar(
    body: &[u8],
    encoding: &'static Encoding,
    opts: &ParseOptions,
) -> Result<Table, String> {
    if !encoding.is_ascii_compatible() {
        return Err(format!("{} is not ASCII compatible", encoding.name()));
    }
    let delimiter = match opts.separator.as_bytes() {
        [b] if b.is_ascii() => *b,
        _ => return Err(format!("separator {:?} is not a single byte", opts.separator)),
    };
    let terminator = match &opts.terminator {
        LineTerminator::Newline => csv::Terminator::CRLF,
        LineTerminator::Cr => csv::Terminator::Any(b'\r'),
        LineTerminator::Custom(t) => match t.as_bytes() {
            [b] if b.is_ascii() => csv::Terminator::Any(*b),
            _ => return Err(format!("terminator {:?} is not a single byte", t)),
        },
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .terminator(terminator)
        .has_headers(false)
        .flexible(false)
        .from_reader(body);

    let mut records = reader.byte_records();
    let decode = |record: &csv::ByteRecord, n: usize| -> Result<Vec<String>, String> {
        record
            .iter()
            .map(|field| {
                encoding
                    .decode_without_bom_handling_and_without_replacement(field)
                    .map(|s| s.into_owned())
                    .ok_or_else(|| format!("invalid {} sequence in record {}", encoding.name(), n))
            })
            .collect()
    };

    let columns = match &opts.column_names {
        None => match records.next() {
            Some(first) => {
                let first = first.map_err(|e| e.to_string())?;
                normalize_headers(decode(&first, 1)?)
            }
            None => return Err("no header row".into()),
        },
        Some(names) => normalize_headers(names.clone()),
    };

    let mut table = Table::new(columns);
    for (idx, record) in records.enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let values = decode(&record, idx + 1)?;
        if values.len() != table.columns.len() {
            return Err(format!(
                "record {} has {} fields, expected {}",
                idx + 1,
                values.len(),
                table.columns.len()
            ));
        }
        table.rows.push(values);
    }
    Ok(table)
}

fn parse_lines(
    body: &[u8],
    encoding: &'static Encoding,
    opts: &ParseOptions,
) -> Result<Table, String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        tracing::warn!(
            event = "decode_replaced",
            encoding = encoding.name(),
            "undecodable bytes replaced"
        );
    }

    let lines: Vec<&str> = match &opts.terminator {
        LineTerminator::Newline => text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect(),
        LineTerminator::Cr => text.split('\r').collect(),
        LineTerminator::Custom(t) => text
            .split(t.as_str())
            .map(|l| l.trim_matches(|c: char| c == '\r' || c == '\n'))
            .collect(),
    };
    let mut lines = lines.into_iter().filter(|l| !l.trim().is_empty());

    let sep = opts.separator.as_str();
    let columns = match &opts.column_names {
        None => {
            let header = lines.next().ok_or("no header row")?;
            normalize_headers(split_fields(header, sep))
        }
        Some(names) => normalize_headers(names.clone()),
    };
    let width = columns.len();
    if width == 0 {
        return Err("no columns".into());
    }

    let mut table = Table::new(columns);
    for line in lines {
        let mut values = split_fields(line, sep);
        if values.len() > width {
            let surplus = values.split_off(width - 1);
            values.push(surplus.join(sep));
        }
        values.resize(width, String::new());
        table.rows.push(values);
    }
    Ok(table)
}

fn split_fields(line: &str, sep: &str) -> Vec<String> {
    line.split(sep).map(unquote).collect()
}

fn unquote(field: &str) -> String {
    let trimmed = field.trim_matches(|c: char| c == ' ' || c == '\t');
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        field.to_string()
    }
}

/// Trims and upper-cases names; blanks become `COLUMN_<n>`, repeats and the
/// reserved `LINE_NUMBER` get a `_2`, `_3`, ... suffix.
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(LINE_NUMBER.to_string());
    raw.into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut base = name.trim().to_uppercase();
            if base.is_empty() {
                base = format!("COLUMN_{}", idx + 1);
            }
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}
