pub mod config;
pub mod error;
pub mod loader;

pub use config::{Config, ParserBackend, ParserConfig, ServerConfig};
pub use error::{Result, StoreError};
pub use loader::{load_csv, load_csv_reader};
