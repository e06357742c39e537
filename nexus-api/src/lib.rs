pub mod config;
pub mod error;
pub mod monitor;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use monitor::{check_running_workspaces, start_health_monitor_task};
pub use routes::create_app;
pub use state::AppState;
