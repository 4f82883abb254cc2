pub mod error;
pub mod patch;
pub mod property;
pub mod uid;

pub use error::*;
pub use patch::*;
pub use property::*;
pub use uid::*;
