pub mod config;
pub mod csv_reader;
pub mod depth;
pub mod errors;
pub mod mae;
pub mod merge;
pub mod multiallelic;
pub mod orient;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod statistics;
pub mod types;
