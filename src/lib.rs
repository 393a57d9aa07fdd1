pub mod builder;
pub mod config;
pub mod constraints;
pub mod error;
pub mod filter;
pub mod optimizer;
pub mod quotes;
pub mod regime;
pub mod report;
pub mod simulation;
pub mod stats;
pub mod strategy;
pub mod universe;
pub mod webui;

pub use error::{Result, StrategyError};
