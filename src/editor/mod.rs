mod handlers;
mod models;
mod placement;
mod state;

pub use handlers::run_server;
pub use placement::{Selection, apply_click, map_click};
pub use state::PreviewItem;
