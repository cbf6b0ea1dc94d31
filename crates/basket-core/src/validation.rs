//! # Validation Module
//!
//! Input checks run before anything touches storage.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller input ──► THIS MODULE ──► engine operation ──► SQLite          │
//! │                       │                                   │             │
//! │                       └─ ValidationError                  └─ CHECK /    │
//! │                          (field-level detail)                FK / UNIQUE│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::ShippingAddress;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates an entity id (UUID string).
///
/// ```rust
/// use basket_core::validation::validate_id;
///
/// assert!(validate_id("cart_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("cart_id", "").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates an anonymous session key.
pub fn validate_session_key(key: &str) -> ValidationResult<()> {
    required_max("session_key", key, 128)
}

// =============================================================================
// Numbers
// =============================================================================

/// Validates a line quantity: 1..=MAX_ITEM_QUANTITY.
///
/// ```rust
/// use basket_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a pre-computed charge such as tax or shipping.
pub fn validate_charge_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Checks that one more line fits in a cart that has `current_lines`.
pub fn ensure_cart_capacity(current_lines: usize) -> CoreResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(CoreError::CartTooLarge {
            max: MAX_CART_ITEMS,
        });
    }
    Ok(())
}

// =============================================================================
// Checkout Fields
// =============================================================================

pub fn validate_shipping_method(method: &str) -> ValidationResult<()> {
    required_max("shipping_method", method, 100)
}

/// Loose address check: one `@`, something on both sides, a dot in the domain.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    required_max("customer_email", email, 254)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "customer_email".to_string(),
            reason: "must be an email address".to_string(),
        });
    }
    Ok(())
}

/// Digits, spaces and `+-()` only, with at least five digits.
pub fn validate_phone(field: &str, phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    required_max(field, phone, 32)?;

    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();

    if !allowed || digits < 5 {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a phone number".to_string(),
        });
    }
    Ok(())
}

pub fn validate_shipping_address(address: &ShippingAddress) -> ValidationResult<()> {
    required_max("shipping_address.full_name", &address.full_name, 200)?;
    required_max("shipping_address.line1", &address.line1, 200)?;
    required_max("shipping_address.city", &address.city, 100)?;
    required_max("shipping_address.postal_code", &address.postal_code, 20)?;
    required_max("shipping_address.country", &address.country, 100)?;

    if let Some(phone) = &address.phone {
        validate_phone("shipping_address.phone", phone)?;
    }
    Ok(())
}

fn required_max(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            line1: "12 St James's Square".to_string(),
            line2: None,
            city: "London".to_string(),
            region: None,
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            phone: Some("+44 20 7946 0000".to_string()),
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(999).is_ok());
        assert!(matches!(
            validate_quantity(-2),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_quantity(1000),
            Err(ValidationError::OutOfRange { max: 999, .. })
        ));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("item_id", &uuid::Uuid::new_v4().to_string()).is_ok());
        assert!(matches!(
            validate_id("item_id", "not-a-uuid"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_cart_capacity() {
        assert!(ensure_cart_capacity(99).is_ok());
        assert!(matches!(
            ensure_cart_capacity(100),
            Err(CoreError::CartTooLarge { max: 100 })
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("ada.example.com").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("customer_phone", "(020) 7946-0000").is_ok());
        assert!(validate_phone("customer_phone", "call me").is_err());
        assert!(validate_phone("customer_phone", "123").is_err());
    }

    #[test]
    fn test_validate_shipping_address() {
        assert!(validate_shipping_address(&address()).is_ok());

        let mut missing_city = address();
        missing_city.city = "  ".to_string();
        assert_eq!(
            validate_shipping_address(&missing_city),
            Err(ValidationError::Required {
                field: "shipping_address.city".to_string()
            })
        );
    }

    #[test]
    fn test_charges_must_not_be_negative() {
        assert!(validate_charge_cents("tax_cents", 0).is_ok());
        assert!(validate_charge_cents("tax_cents", -1).is_err());
    }
}
