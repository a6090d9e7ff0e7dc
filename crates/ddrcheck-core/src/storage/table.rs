use serde::Serialize;

/// Normalized tabular content; every value is text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rough heap footprint, used to weigh entries in the content cache.
    pub fn estimated_bytes(&self) -> usize {
        let cell = std::mem::size_of::<String>();
        let header: usize = self.columns.iter().map(|c| c.len() + cell).sum();
        let body: usize = self
            .rows
            .iter()
            .map(|r| r.iter().map(|v| v.len() + cell).sum::<usize>() + cell)
            .sum();
        header + body
    }
}
