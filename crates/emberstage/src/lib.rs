pub mod catalog;
pub mod config;
pub mod defines;
pub mod error;
pub mod executor;
pub mod expr;
pub mod planner;
pub mod util;

pub use error::{Error, Result};
