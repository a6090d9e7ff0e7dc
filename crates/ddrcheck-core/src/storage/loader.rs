use super::content_cache::ContentCache;
use super::parse::{self, ParseOptions, LINE_NUMBER};
use super::sqlite::{self, quote_ident};
use super::table::Table;
use crate::errors::{ConfigError, LoaderError};
use crate::model::{ScopeMetadata, Structure};
use crate::scope::ScopeStore;
use anyhow::Context;
use rusqlite::{Connection, ToSql};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

pub const CACHE_DIR: &str = ".sqlite_cache";
pub const CACHE_SUFFIX: &str = "_cache.sqlite";
pub const DATA_TABLE: &str = "data";

/// Everything needed to read one logical file.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub metadata: ScopeMetadata,
    pub structure: Structure,
}

impl FileConfig {
    pub fn parse_options(&self) -> Result<ParseOptions, ConfigError> {
        Ok(ParseOptions {
            separator: self.metadata.separator(),
            terminator: self.metadata.line_terminator(),
            encoding: parse::resolve_encoding(&self.metadata.encoding)?,
            column_names: if self.metadata.header {
                None
            } else {
                Some(self.structure.names())
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBuild {
    Built { rows: usize },
    Reused,
}

/// A logical file of a (scope, version) bound to an input folder.
#[derive(Debug)]
pub struct ExtractorFile {
    scope: String,
    version: String,
    name: String,
    input_dir: PathBuf,
    store: ScopeStore,
    config: OnceLock<Result<Arc<FileConfig>, ConfigError>>,
    loader: SqliteFileLoader,
    content_cache: Option<ContentCache>,
}

impl ExtractorFile {
    pub fn new(
        store: &ScopeStore,
        scope: &str,
        version: &str,
        name: &str,
        input_dir: impl Into<PathBuf>,
    ) -> Self {
        let input_dir = input_dir.into();
        let cache_path = input_dir
            .join(CACHE_DIR)
            .join(format!("{}{}", name, CACHE_SUFFIX));
        Self {
            scope: scope.to_string(),
            version: version.to_string(),
            name: name.to_string(),
            input_dir,
            store: store.clone(),
            config: OnceLock::new(),
            loader: SqliteFileLoader::new(cache_path),
            content_cache: None,
        }
    }

    pub fn with_content_cache(mut self, cache: ContentCache) -> Self {
        self.content_cache = Some(cache);
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_path(&self) -> &Path {
        self.loader.cache_path()
    }

    /// Metadata and structure, read from disk on first use only.
    pub fn config(&self) -> Result<Arc<FileConfig>, ConfigError> {
        self.config
            .get_or_init(|| {
                let metadata = self.store.load_metadata(&self.scope)?;
                let structure = self
                    .store
                    .load_structure(&self.scope, &self.version, &self.name)?;
                Ok(Arc::new(FileConfig {
                    metadata,
                    structure,
                }))
            })
            .clone()
    }

    /// First file (sorted) in the input folder matching `<name>*.<ext>`.
    pub fn find_file(&self) -> Result<PathBuf, LoaderError> {
        let cfg = self.config()?;
        let ext = cfg.metadata.extension().to_string();
        let pattern = format!(
            "{}/{}*.{}",
            glob::Pattern::escape(&self.input_dir.to_string_lossy()),
            glob::Pattern::escape(&self.name),
            glob::Pattern::escape(&ext)
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| ConfigError(format!("bad file pattern {}: {}", pattern, e)))?;
        let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        matches.sort();

        if matches.len() > 1 {
            tracing::warn!(
                event = "source_ambiguous",
                file = %self.name,
                candidates = matches.len(),
                picked = %matches[0].display(),
                "several source files match, using the first"
            );
        }
        matches.into_iter().next().ok_or_else(|| LoaderError::NotFound {
            name: self.name.clone(),
            extension: ext,
            dir: self.input_dir.clone(),
        })
    }

    pub fn ensure_cached(&self) -> Result<CacheBuild, LoaderError> {
        self.loader.ensure(self)
    }

    /// Read-only connection to the cache, building it first if needed.
    pub fn open(&self) -> Result<Connection, LoaderError> {
        self.ensure_cached()?;
        Ok(sqlite::open_read_only(self.cache_path())?)
    }

    /// Whole cache table, `LINE_NUMBER` first, in line order.
    pub fn load(&self) -> anyhow::Result<Arc<Table>> {
        if let Some(hit) = self.content_cache.as_ref().and_then(|c| c.get(self.cache_path())) {
            return Ok(hit);
        }
        let conn = self.open()?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            DATA_TABLE,
            quote_ident(LINE_NUMBER)
        );
        let table = Arc::new(
            sqlite::query_table(&conn, &sql, [])
                .with_context(|| format!("failed to read cache for {}", self.name))?,
        );
        if let Some(cache) = &self.content_cache {
            cache.insert(self.cache_path(), table.clone());
        }
        Ok(table)
    }

    /// Only the named columns (plus nothing else), in line order.
    pub fn load_partial(&self, columns: &[&str]) -> Result<Table, LoaderError> {
        let conn = self.open()?;
        let known = table_columns(&conn)?;
        let mut selected = Vec::with_capacity(columns.len());
        for col in columns {
            let found = known
                .iter()
                .find(|k| k.eq_ignore_ascii_case(col))
                .ok_or_else(|| LoaderError::UnknownColumn(col.to_string()))?;
            selected.push(quote_ident(found));
        }
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            selected.join(", "),
            DATA_TABLE,
            quote_ident(LINE_NUMBER)
        );
        Ok(sqlite::query_table(&conn, &sql, [])?)
    }

    /// Column names of the cache table, `LINE_NUMBER` excluded.
    pub fn columns(&self) -> Result<Vec<String>, LoaderError> {
        let conn = self.open()?;
        let mut cols = table_columns(&conn)?;
        cols.retain(|c| c != LINE_NUMBER);
        Ok(cols)
    }

    /// Drops the cache file and any memoized content.
    pub fn invalidate(&self) -> std::io::Result<()> {
        if let Some(cache) = &self.content_cache {
            cache.invalidate(self.cache_path());
        }
        match std::fs::remove_file(self.cache_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn table_columns(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT 0", DATA_TABLE))?;
    Ok(stmt.column_names().iter().map(|c| c.to_string()).collect())
}

/// One lock per cache path, shared by every loader in the process.
fn build_lock(cache_path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(cache_path.to_path_buf()).or_default().clone()
}

/// Builds the on-disk cache of one source file, once.
#[derive(Debug)]
pub struct SqliteFileLoader {
    cache_path: PathBuf,
}

impl SqliteFileLoader {
    pub fn new(cache_path: PathBuf) -> Self {
        Self { cache_path }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn ensure(&self, file: &ExtractorFile) -> Result<CacheBuild, LoaderError> {
        if self.cache_path.exists() {
            return Ok(CacheBuild::Reused);
        }
        let lock = build_lock(&self.cache_path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cache_path.exists() {
            return Ok(CacheBuild::Reused);
        }

        let started = Instant::now();
        let opts = file.config()?.parse_options()?;
        let source = file.find_file()?;
        let bytes = std::fs::read(&source)?;
        let table = parse::parse_source(&source, &bytes, &opts)?;
        drop(bytes);

        let rows = table.rows.len();
        write_cache(&self.cache_path, &table)?;
        drop(table);

        tracing::info!(
            event = "cache_built",
            file = %file.name(),
            source = %source.display(),
            rows,
            duration_ms = started.elapsed().as_millis() as u64,
            "cache built"
        );
        Ok(CacheBuild::Built { rows })
    }
}

/// Writes `table` into a uniquely named sibling temp file in one
/// transaction, then renames it onto `path`.
fn write_cache(path: &Path, table: &Table) -> Result<(), LoaderError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp = tempfile::Builder::new()
        .prefix(".cache-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    write_table(tmp.path(), table)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_table(path: &Path, table: &Table) -> Result<(), LoaderError> {
    let mut conn = Connection::open(path)?;
    let mut ddl = vec![format!("{} INTEGER", quote_ident(LINE_NUMBER))];
    ddl.extend(table.columns.iter().map(|c| format!("{} TEXT", quote_ident(c))));
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        DATA_TABLE,
        ddl.join(", ")
    ))?;

    let placeholders = vec!["?"; table.columns.len() + 1].join(", ");
    let insert = format!("INSERT INTO {} VALUES ({})", DATA_TABLE, placeholders);

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for (idx, row) in table.rows.iter().enumerate() {
            let line = idx as i64 + 1;
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(row.len() + 1);
            values.push(&line);
            values.extend(row.iter().map(|v| v as &dyn ToSql));
            stmt.execute(values.as_slice())?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Deletes every `*_cache.sqlite` under `<input>/.sqlite_cache`.
pub fn clear_cache(input_dir: &Path) -> anyhow::Result<usize> {
    let dir = input_dir.join(CACHE_DIR);
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    let entries =
        std::fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_cache = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(CACHE_SUFFIX))
            .unwrap_or(false);
        if !is_cache {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                event = "cache_clear_failed",
                path = %path.display(),
                error = %e,
                "could not delete cache file"
            ),
        }
    }
    tracing::info!(event = "cache_cleared", dir = %dir.display(), removed);
    Ok(removed)
}
