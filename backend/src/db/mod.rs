pub mod connection;
pub mod connections;
pub mod memory;
pub mod migrations;

pub use connection::{get_db_pool, DatabaseConfig};
pub use connections::{ConnectionStore, PgConnectionStore, StoreError};
pub use memory::MemoryConnectionStore;
