pub mod sqlite;

pub use sqlite::SqliteVectorIndex;
