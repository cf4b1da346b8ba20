#![warn(rust_2018_idioms)]

#[macro_use]
pub mod r#macro;

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod error;
pub mod mock;
pub mod realm;
pub mod rmi;
pub mod scenario;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate log;

pub use checkpoint::{Checkpoint, Ledger, Verdict};
pub use error::Error;
pub use scenario::{Fixture, Report, Scenario};
