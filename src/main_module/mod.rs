//! Application wiring split from main.rs

mod bootstrap;
mod health;
mod server;

pub use bootstrap::*;
pub use health::*;
pub use server::*;
