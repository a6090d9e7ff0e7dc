//! Violation kinds as they appear in reports and exports.

pub const LENGTH_EXCEEDED: &str = "Length exceeds declared size";
pub const NOT_NUMERIC: &str = "Not numeric";
pub const NOT_DECIMAL: &str = "Not decimal";
pub const INTEGER_OVERFLOW: &str = "Integer digits overflow";
pub const FRACTION_OVERFLOW: &str = "Fractional digits overflow";
pub const MISSING_SIZE: &str = "Missing size or precision";
pub const COLUMN_MISSING: &str = "Column missing from file";
pub const PK_NOT_INFORMED: &str = "PK not informed";
pub const PK_DUPLICATED: &str = "Duplicated";

/// Pseudo-field holding whole-key findings.
pub const PK_FIELD: &str = "__PK__";
