mod admin_routes;
pub mod metrics;
pub mod server;
pub mod state;

pub use admin_routes::admin_routes;
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};
pub use state::ServerState;
