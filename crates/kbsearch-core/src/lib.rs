#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! kbsearch-core
//!
//! Shared data model, the `RetrieveEngine` contract implemented by every
//! search backend, the error taxonomy, and configuration/logging helpers.

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::RetrieveEngine;
