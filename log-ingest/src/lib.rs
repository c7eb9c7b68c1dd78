pub mod app;
pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod log_entry;
pub mod metrics_consts;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod prometheus;
pub mod row;
pub mod source;
pub mod warehouse;

pub use app::{create_router, AppState};
pub use config::Config;
pub use pipeline::{IngestionPipeline, RunOutcome, RunReport};
