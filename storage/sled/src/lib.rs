mod database;
pub mod engine;
pub mod error;

pub use engine::SledBackend;
pub use error::SledError;
