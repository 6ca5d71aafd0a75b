//! Persistence layer: the `Database` trait, row types, and the SQLite
//! backend.

mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::SqliteDatabase;
pub use traits::Database;
pub use types::{Journalist, NewJournalist, NewSource, Source};
