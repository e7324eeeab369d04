//! Record types of the sample application

mod customer;

pub use customer::Customer;

/// DDL applied on startup when running against SQLite
pub const SQLITE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0,
    place_of_birth TEXT,
    tags TEXT,
    vip INTEGER NOT NULL DEFAULT 0
)";
