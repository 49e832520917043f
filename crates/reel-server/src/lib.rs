pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod stream;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
pub use shutdown::ShutdownCoordinator;
