pub mod cell;
pub mod config;
pub mod error;
pub mod report;
pub mod run;

pub use cell::*;
pub use config::LoadConfig;
pub use error::*;
pub use report::*;
pub use run::*;
