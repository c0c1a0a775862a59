pub mod api;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod features;
pub mod labels;
pub mod model_download;
pub mod sequence;
pub mod service;
pub mod shape;
pub mod source;
pub mod types;
mod worker;

pub use error::{Result, ServiceError};
pub use service::SignService;
