pub mod batch;
pub mod classifier;
pub mod config;
pub mod db;
pub mod model;
pub mod pipeline;
pub mod report;
