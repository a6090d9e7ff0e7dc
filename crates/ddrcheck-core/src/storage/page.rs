use super::loader::{ExtractorFile, DATA_TABLE};
use super::sqlite::query_table;
use crate::errors::LoaderError;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 0-based; may be lower than requested after step-back.
    pub page: usize,
    pub page_size: usize,
    pub total_rows: usize,
    pub total_pages: usize,
}

/// Paged, read-only access to a file's cache table.
#[derive(Debug, Clone)]
pub struct PagedQuery {
    page_size: usize,
    query: Option<String>,
    count: Option<CountKey>,
}

#[derive(Debug, Clone)]
struct CountKey {
    db: PathBuf,
    sql: String,
    total: usize,
}

impl PagedQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            query: None,
            count: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// `None` or blank restores `SELECT * FROM data`.
    pub fn set_query(&mut self, query: Option<String>) {
        self.query = query
            .map(|q| q.trim().trim_end_matches(';').trim_end().to_string())
            .filter(|q| !q.is_empty());
    }

    pub fn query(&self) -> String {
        self.query
            .clone()
            .unwrap_or_else(|| format!("SELECT * FROM {}", DATA_TABLE))
    }

    pub fn fetch(&mut self, file: &ExtractorFile, page: usize) -> Result<Page, LoaderError> {
        let conn = file.open()?;
        let sql = self.query();
        let total_rows = self.total_rows(&conn, file, &sql)?;
        let total_pages = total_rows.div_ceil(self.page_size).max(1);

        if has_paging_clause(&sql) {
            let table = query_table(&conn, &sql, [])?;
            return Ok(Page {
                columns: table.columns,
                rows: table.rows,
                page: 0,
                page_size: self.page_size,
                total_rows,
                total_pages,
            });
        }

        let paged_sql = format!("{}\nLIMIT ? OFFSET ?", sql);
        let mut page = page.min(total_pages - 1);
        loop {
            let offset = page * self.page_size;
            let table = query_table(
                &conn,
                &paged_sql,
                rusqlite::params![self.page_size as i64, offset as i64],
            )?;
            if table.rows.is_empty() && total_rows > 0 && page > 0 {
                page -= 1;
                continue;
            }
            return Ok(Page {
                columns: table.columns,
                rows: table.rows,
                page,
                page_size: self.page_size,
                total_rows,
                total_pages,
            });
        }
    }

    fn total_rows(
        &mut self,
        conn: &Connection,
        file: &ExtractorFile,
        sql: &str,
    ) -> Result<usize, LoaderError> {
        if let Some(key) = &self.count {
            if key.db == file.cache_path() && key.sql == sql {
                return Ok(key.total);
            }
        }
        let total: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM ({}\n)", sql), [], |r| {
            r.get(0)
        })?;
        let total = total.max(0) as usize;
        self.count = Some(CountKey {
            db: file.cache_path().to_path_buf(),
            sql: sql.to_string(),
            total,
        });
        Ok(total)
    }
}

impl Default for PagedQuery {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

fn has_paging_clause(sql: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(limit|offset)\b").expect("static regex"))
        .is_match(sql)
}
