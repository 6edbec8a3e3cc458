pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod validation;

pub use router::build_router;
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
