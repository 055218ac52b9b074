pub mod config;
pub mod error;
pub mod types;

pub use config::TrendwireConfig;
pub use error::{Result, TrendwireError};
pub use types::*;
