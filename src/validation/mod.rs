use std::fmt;

use crate::domain::OrderPatch;

pub const CUSTOMER_NAME_MAX_LEN: usize = 255;
pub const CUSTOMER_ADDS_MAX_LEN: usize = 1024;
pub const IDENTIFIER_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Store, order and transaction ids end up in upstream URL paths.
pub fn validate_identifier(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, IDENTIFIER_MAX_LEN)?;

    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control() || ch == '/') {
        return Err(ValidationError::new(
            field,
            "must not contain whitespace, control characters or '/'",
        ));
    }

    Ok(())
}

/// Checks an order patch before it is dispatched and returns the sanitized copy.
pub fn validate_order_patch(patch: &OrderPatch) -> Result<OrderPatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::new(
            "patch",
            "must set at least one of status, customerName, customerAdds",
        ));
    }

    let customer_name = match &patch.customer_name {
        Some(name) => {
            let name = sanitize_string(name);
            validate_required("customerName", &name)?;
            validate_max_len("customerName", &name, CUSTOMER_NAME_MAX_LEN)?;
            Some(name)
        }
        None => None,
    };

    let customer_adds = match &patch.customer_adds {
        Some(adds) => {
            let adds = sanitize_string(adds);
            validate_required("customerAdds", &adds)?;
            validate_max_len("customerAdds", &adds, CUSTOMER_ADDS_MAX_LEN)?;
            Some(adds)
        }
        None => None,
    };

    Ok(OrderPatch {
        status: patch.status,
        customer_name,
        customer_adds,
    })
}
