pub mod error;
pub mod models;
pub mod protocol;
pub mod lookup;
pub mod flowlog;
pub mod aggregate;
pub mod digest;
pub mod report;

pub use error::{FlowTagError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
