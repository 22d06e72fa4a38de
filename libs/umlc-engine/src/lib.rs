pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod probe;
pub mod session;
pub mod workspace;


pub use cancel::CancelToken;
pub use config::LanguageConfigManager;
pub use error::ExecutionError;
pub use executor::Orchestrator;
pub use session::{AppContext, RunHandle, Session, SessionError};
