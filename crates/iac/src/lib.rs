//! Terraform ingestion: file discovery, HCL and plan parsing, model merging
//! and dependency inference.

pub mod analyzer;
pub mod convert;
pub mod deps;
pub mod files;
pub mod merge;
pub mod plan;
pub mod runner;
pub mod tf;

pub use analyzer::IacAnalyzer;
pub use files::{FileLimits, IacFile};
pub use runner::{pick_runner, Runner};
