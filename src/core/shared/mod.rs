pub mod error;
pub mod schema;
pub mod state;
pub mod utils;

pub use error::{AppError, AppResult, FieldErrors};
pub use schema::*;
