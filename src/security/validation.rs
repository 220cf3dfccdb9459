use regex::Regex;
use std::sync::LazyLock;

use crate::core::shared::error::{AppError, AppResult, FieldErrors};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Required(String),
    TooShort { field: String, min: usize, actual: usize },
    TooLong { field: String, max: usize, actual: usize },
    InvalidFormat { field: String, expected: String },
    InvalidRange { field: String, min: String, max: String },
    InvalidValue { field: String, message: String },
    InvalidEmail(String),
    InvalidUrl(String),
    InvalidPhone(String),
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::Required(field)
            | Self::InvalidEmail(field)
            | Self::InvalidUrl(field)
            | Self::InvalidPhone(field) => field,
            Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::InvalidFormat { field, .. }
            | Self::InvalidRange { field, .. }
            | Self::InvalidValue { field, .. } => field,
        }
    }

    /// Message without the field name, as shown next to a form input.
    pub fn message(&self) -> String {
        match self {
            Self::Required(_) => "is required".to_string(),
            Self::TooShort { min, .. } => format!("must be at least {min} characters"),
            Self::TooLong { max, .. } => format!("must be at most {max} characters"),
            Self::InvalidFormat { expected, .. } => format!("must be {expected}"),
            Self::InvalidRange { min, max, .. } => format!("must be between {min} and {max}"),
            Self::InvalidValue { message, .. } => message.clone(),
            Self::InvalidEmail(_) => "must be a valid email address".to_string(),
            Self::InvalidUrl(_) => "must be a valid URL".to_string(),
            Self::InvalidPhone(_) => "must be a valid phone number".to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}' {}", self.field(), self.message())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    pub fn field_errors(&self) -> FieldErrors {
        let mut fields = FieldErrors::new();
        for error in &self.errors {
            fields
                .entry(error.field().to_string())
                .or_default()
                .push(error.message());
        }
        fields
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::Validation(self.field_errors()))
        }
    }
}

/// Request bodies that check themselves before reaching the database.
pub trait Validate {
    fn validate(&self) -> ValidationResult;

    fn validated(self) -> AppResult<Self>
    where
        Self: Sized,
    {
        self.validate().into_result()?;
        Ok(self)
    }
}

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("Invalid email regex")
});

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*(:\d+)?(/[-a-zA-Z0-9()@:%_\+.~#?&/=]*)?$"
    ).expect("Invalid URL regex")
});

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[1-9]\d{6,14}$").expect("Invalid phone regex")
});

static HEX_COLOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").expect("Invalid color regex")
});

pub fn validate_string_required(value: &str, field_name: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required(field_name.to_string()))
    } else {
        Ok(())
    }
}

pub fn validate_length(
    value: &str,
    field_name: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), ValidationError> {
    let len = value.chars().count();

    if let Some(min_len) = min {
        if len < min_len {
            return Err(ValidationError::TooShort {
                field: field_name.to_string(),
                min: min_len,
                actual: len,
            });
        }
    }

    if let Some(max_len) = max {
        if len > max_len {
            return Err(ValidationError::TooLong {
                field: field_name.to_string(),
                max: max_len,
                actual: len,
            });
        }
    }

    Ok(())
}

pub fn validate_email(email: &str, field_name: &str) -> Result<(), ValidationError> {
    if email.len() <= 254 && EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(field_name.to_string()))
    }
}

pub fn validate_url(url: &str, field_name: &str) -> Result<(), ValidationError> {
    if url.len() <= 2048 && URL_REGEX.is_match(url) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrl(field_name.to_string()))
    }
}

pub fn validate_phone(phone: &str, field_name: &str) -> Result<(), ValidationError> {
    let digits: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if PHONE_REGEX.is_match(&digits) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhone(field_name.to_string()))
    }
}

pub fn validate_hex_color(value: &str, field_name: &str) -> Result<(), ValidationError> {
    if HEX_COLOR_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: field_name.to_string(),
            expected: "a hex color like #1e88e5".to_string(),
        })
    }
}

pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    field_name: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), ValidationError> {
    let below = min.as_ref().is_some_and(|m| value < *m);
    let above = max.as_ref().is_some_and(|m| value > *m);

    if below || above {
        return Err(ValidationError::InvalidRange {
            field: field_name.to_string(),
            min: min.map(|m| m.to_string()).unwrap_or_else(|| "-∞".to_string()),
            max: max.map(|m| m.to_string()).unwrap_or_else(|| "∞".to_string()),
        });
    }

    Ok(())
}

pub fn validate_one_of(value: &str, field_name: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field_name.to_string(),
            message: format!("must be one of: {}", allowed.join(", ")),
        })
    }
}

/// Collects every failing check instead of stopping at the first one.
pub struct Validator {
    result: ValidationResult,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            result: ValidationResult::new(),
        }
    }

    fn push(mut self, outcome: Result<(), ValidationError>) -> Self {
        if let Err(e) = outcome {
            self.result.add_error(e);
        }
        self
    }

    pub fn string_required(self, value: &str, field_name: &str) -> Self {
        self.push(validate_string_required(value, field_name))
    }

    /// Required plus a maximum length, the common case for names.
    pub fn name(self, value: &str, field_name: &str, max: usize) -> Self {
        let outcome = validate_string_required(value, field_name)
            .and_then(|_| validate_length(value.trim(), field_name, None, Some(max)));
        self.push(outcome)
    }

    pub fn length(self, value: &str, field_name: &str, min: Option<usize>, max: Option<usize>) -> Self {
        self.push(validate_length(value, field_name, min, max))
    }

    pub fn optional_length(self, value: Option<&str>, field_name: &str, max: usize) -> Self {
        match value {
            Some(v) => self.push(validate_length(v, field_name, None, Some(max))),
            None => self,
        }
    }

    pub fn email(self, value: &str, field_name: &str) -> Self {
        self.push(validate_email(value.trim(), field_name))
    }

    /// Blank strings count as absent.
    pub fn optional_email(self, value: Option<&str>, field_name: &str) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.push(validate_email(v, field_name)),
            None => self,
        }
    }

    pub fn optional_phone(self, value: Option<&str>, field_name: &str) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.push(validate_phone(v, field_name)),
            None => self,
        }
    }

    pub fn optional_url(self, value: Option<&str>, field_name: &str) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.push(validate_url(v, field_name)),
            None => self,
        }
    }

    pub fn optional_color(self, value: Option<&str>, field_name: &str) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.push(validate_hex_color(v, field_name)),
            None => self,
        }
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        self,
        value: T,
        field_name: &str,
        min: Option<T>,
        max: Option<T>,
    ) -> Self {
        self.push(validate_range(value, field_name, min, max))
    }

    pub fn positive(self, value: f64, field_name: &str) -> Self {
        if value.is_finite() && value > 0.0 {
            self
        } else {
            self.push(Err(ValidationError::InvalidValue {
                field: field_name.to_string(),
                message: "must be greater than zero".to_string(),
            }))
        }
    }

    pub fn one_of(self, value: &str, field_name: &str, allowed: &[&str]) -> Self {
        self.push(validate_one_of(value, field_name, allowed))
    }

    pub fn custom<F>(self, validation_fn: F) -> Self
    where
        F: FnOnce() -> Option<ValidationError>,
    {
        match validation_fn() {
            Some(error) => self.push(Err(error)),
            None => self,
        }
    }

    pub fn check(self, outcome: Result<(), ValidationError>) -> Self {
        self.push(outcome)
    }

    pub fn result(self) -> ValidationResult {
        self.result
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_string_required() {
        assert!(validate_string_required("value", "field").is_ok());
        assert!(validate_string_required("", "field").is_err());
        assert!(validate_string_required("  ", "field").is_err());
    }

    #[test]
    fn test_validate_length_counts_chars() {
        assert!(validate_length("hello", "field", Some(1), Some(10)).is_ok());
        assert!(validate_length("hi", "field", Some(3), None).is_err());
        assert!(validate_length("hello world", "field", None, Some(5)).is_err());
        assert!(validate_length("ñandú", "field", None, Some(5)).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com", "email").is_ok());
        assert!(validate_email("user.name+tag@domain.co.uk", "email").is_ok());
        assert!(validate_email("invalid", "email").is_err());
        assert!(validate_email("@domain.com", "email").is_err());
        assert!(validate_email("user@", "email").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com", "website").is_ok());
        assert!(validate_url("http://localhost:9000/bucket/key.png", "url").is_ok());
        assert!(validate_url("ftp://invalid.com", "website").is_err());
        assert!(validate_url("not-a-url", "website").is_err());
    }

    #[test]
    fn test_validate_phone_accepts_formatting() {
        assert!(validate_phone("+1234567890", "phone").is_ok());
        assert!(validate_phone("(555) 123-4567", "phone").is_ok());
        assert!(validate_phone("123", "phone").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(5, "n", Some(0), Some(10)).is_ok());
        assert!(validate_range(-1, "n", Some(0), None).is_err());
        assert!(validate_range(101.0, "rate", Some(0.0), Some(100.0)).is_err());
    }

    #[test]
    fn test_validate_one_of() {
        assert!(validate_one_of("quartz", "stone_type", &["granite", "quartz"]).is_ok());
        let err = validate_one_of("wood", "stone_type", &["granite", "quartz"]).unwrap_err();
        assert_eq!(err.message(), "must be one of: granite, quartz");
    }

    #[test]
    fn test_validator_collects_field_errors() {
        let result = Validator::new()
            .string_required("", "name")
            .optional_email(Some("nope"), "email")
            .optional_email(Some("   "), "backup_email")
            .optional_phone(None, "phone")
            .result();

        let fields = result.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["name"], vec!["is required".to_string()]);
        assert_eq!(fields["email"], vec!["must be a valid email address".to_string()]);
    }

    #[test]
    fn test_into_result_maps_to_validation_error() {
        let err = Validator::new()
            .positive(0.0, "width")
            .result()
            .into_result()
            .unwrap_err();
        match err {
            AppError::Validation(fields) => assert!(fields.contains_key("width")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_includes_field() {
        let err = ValidationError::Required("name".into());
        assert_eq!(err.to_string(), "Field 'name' is required");
    }
}
