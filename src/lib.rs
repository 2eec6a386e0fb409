pub mod bucket;
pub mod config;
pub mod humanize;
pub mod indexer;
pub mod observability;
pub mod paginator;
pub mod sink;
pub mod worker;
