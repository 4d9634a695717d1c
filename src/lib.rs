pub mod audio;
pub mod config;
pub mod device;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod memory;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod supervisor;
pub mod tools;
pub mod vad;
pub mod wake;

// Re-export commonly used items for convenience
pub use config::{AgentConfig, AppConfig};
pub use errors::app_error::{AppError, AppResult};
pub use events::{Event, EventBus, EventKind};
pub use state::AppState;
pub use supervisor::Supervisor;
