pub mod config;
pub mod db_pool;
pub mod db_schema;
pub mod duplicate_filter;
pub mod error;
pub mod file_scanner;
pub mod image_normalizer;
pub mod ingest;
pub mod mimetype_detector;
pub mod models;
pub mod store;
pub mod sync;
pub mod upload;
