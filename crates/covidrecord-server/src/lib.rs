pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod record;
pub mod server;

pub use config::AppConfig;
pub use error::ServerError;
pub use record::RecordView;
pub use server::{AppState, CovidRecordServer, build_app};
