use crate::errors::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Per-scope file format description (`metadata.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScopeMetadata {
    #[serde(rename = "Separator")]
    pub separator: String,
    #[serde(rename = "Extension")]
    pub extension: String,
    #[serde(rename = "Encoding", default = "default_encoding")]
    pub encoding: String,
    #[serde(rename = "Header", default = "default_true")]
    pub header: bool,
    #[serde(rename = "Nulable", default)]
    pub nullable: bool,
    #[serde(rename = "Endline", default, skip_serializing_if = "Option::is_none")]
    pub endline: Option<String>,
}

fn default_encoding() -> String {
    "utf-8".into()
}

fn default_true() -> bool {
    true
}

impl ScopeMetadata {
    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim().trim_start_matches('.')
    }

    /// Field separator, with the `TAB` spelling accepted.
    pub fn separator(&self) -> String {
        match self.separator.as_str() {
            "TAB" | "tab" | "\\t" => "\t".into(),
            other => other.to_string(),
        }
    }

    pub fn line_terminator(&self) -> LineTerminator {
        match self.endline.as_deref().map(|s| s.trim_matches(' ')) {
            None | Some("") | Some("LF") | Some("\n") | Some("\\n") | Some("CRLF")
            | Some("\r\n") | Some("\\r\\n") => LineTerminator::Newline,
            Some("CR") | Some("\r") | Some("\\r") => LineTerminator::Cr,
            Some(other) => LineTerminator::Custom(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTerminator {
    /// `\n`, with an optional preceding `\r`.
    Newline,
    Cr,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Varchar,
    Integer,
    Decimal,
    Date,
    Other(String),
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "VARCHAR" | "VARCHAR2" | "CHAR" => FieldType::Varchar,
            "INTEGER" | "INT" => FieldType::Integer,
            "DECIMAL" => FieldType::Decimal,
            "DATE" => FieldType::Date,
            _ => FieldType::Other(upper),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Varchar => "VARCHAR",
            FieldType::Integer => "INTEGER",
            FieldType::Decimal => "DECIMAL",
            FieldType::Date => "DATE",
            FieldType::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(
        default,
        deserialize_with = "de_flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub pk: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType, size: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            size,
            precision: None,
            pk: false,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.pk = true;
        self
    }
}

/// DDR importers write `pk: Y`; the scope editor writes booleans.
fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(d)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        Some(Flag::Text(s)) => parse_flag(&s),
    })
}

/// Truthy spellings found in data dictionaries (`Y`, `S`, `SI`, `X`, ...).
pub fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_uppercase().as_str(),
        "Y" | "S" | "YES" | "SI" | "X" | "TRUE" | "1"
    )
}

/// Ordered field definitions for one (scope, version, file).
///
/// Names are trimmed, upper-cased and unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Structure {
    fields: Vec<FieldDef>,
}

impl Structure {
    pub fn from_fields(fields: Vec<FieldDef>) -> Result<Self, ConfigError> {
        if fields.is_empty() {
            return Err(ConfigError("structure has no fields".into()));
        }
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(fields.len());
        for (idx, mut f) in fields.into_iter().enumerate() {
            f.name = f.name.trim().to_uppercase();
            if f.name.is_empty() {
                return Err(ConfigError(format!("field #{} has an empty name", idx + 1)));
            }
            if !seen.insert(f.name.clone()) {
                return Err(ConfigError(format!("duplicate field name '{}'", f.name)));
            }
            normalized.push(f);
        }
        Ok(Self { fields: normalized })
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn pk_fields(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| f.pk).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Pending,
    Ok,
    Error,
    Warning,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Ok => "ok",
            TestStatus::Error => "error",
            TestStatus::Warning => "warning",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One offending row. `line == None` flags the whole column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub line: Option<i64>,
    pub value: Option<String>,
}

/// field -> violation kind -> offending rows, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, BTreeMap<String, Vec<Violation>>>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, kind: &str, line: Option<i64>, value: Option<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .push(Violation { line, value });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.0.len()
    }

    pub fn total(&self) -> usize {
        self.0
            .values()
            .flat_map(|kinds| kinds.values())
            .map(Vec::len)
            .sum()
    }

    pub fn get(&self, field: &str, kind: &str) -> &[Violation] {
        self.0
            .get(field)
            .and_then(|kinds| kinds.get(kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Vec<Violation>>)> {
        self.0.iter()
    }
}
