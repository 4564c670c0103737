pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
pub(self) mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, make_metrics_app, run_server, LAST_EVENT_ID_HEADER};
pub use session::{Session, HEADER_USER_ID_KEY};
pub use state::ServerState;
