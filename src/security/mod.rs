pub mod cors;
pub mod csrf;
pub mod password;
pub mod session;
pub mod validation;

pub use cors::CorsConfig;
pub use csrf::{require_csrf, CsrfManager, CsrfValidationResult, CSRF_HEADER};
pub use password::{hash_password, verify_password};
pub use validation::{Validate, ValidationError, ValidationResult, Validator};
