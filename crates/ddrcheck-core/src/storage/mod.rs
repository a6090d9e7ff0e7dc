pub mod content_cache;
pub mod loader;
pub mod page;
pub mod parse;
pub mod sqlite;
pub mod table;

pub use content_cache::ContentCache;
pub use loader::{clear_cache, CacheBuild, ExtractorFile, FileConfig, SqliteFileLoader};
pub use page::{Page, PagedQuery};
pub use table::Table;
