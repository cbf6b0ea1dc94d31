//! # Discount Model
//!
//! Typed discount definitions built from stored rows.
//!
//! ## From Row To Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  discounts row                          Discount                        │
//! │  ─────────────────────────────          ───────────────────────────     │
//! │  discount_type + value        ──────►   DiscountBenefit                 │
//! │                                           Percentage(10.00%)            │
//! │                                           FixedAmount(5.00)             │
//! │                                           FreeShipping                  │
//! │                                                                         │
//! │  scope + association tables   ──────►   DiscountTarget                  │
//! │                                           AllLines | CustomerGroups     │
//! │                                           Products{..} | Categories{..} │
//! │                                           Unsupported(Collections)      │
//! │                                                                         │
//! │  metadata (JSON text)         ──────►   DiscountExtensions (versioned)  │
//! │                                           bundle: min_quantity          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conversion happens once, when the row is read. A row that does not
//! convert (bad value range, unknown metadata version) never reaches the
//! evaluator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;

use crate::error::{InapplicableReason, ValidationError};
use crate::money::{Money, Percentage};
use crate::MAX_DISCOUNT_CODE_LEN;

// =============================================================================
// Stored Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    FreeShipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    All,
    Products,
    Categories,
    Collections,
    CustomerGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountStatus {
    Active,
    #[default]
    Draft,
    Expired,
    Archived,
}

// =============================================================================
// Discount Code
// =============================================================================

/// A normalized discount code: trimmed, inner whitespace collapsed to one
/// space, uppercased.
///
/// ```rust
/// use basket_core::discount::DiscountCode;
///
/// let code = DiscountCode::parse("  save   5 ").unwrap();
/// assert_eq!(code.as_str(), "SAVE 5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountCode(String);

impl DiscountCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        if normalized.is_empty() {
            return Err(ValidationError::Required {
                field: "code".to_string(),
            });
        }

        if normalized.chars().count() > MAX_DISCOUNT_CODE_LEN {
            return Err(ValidationError::TooLong {
                field: "code".to_string(),
                max: MAX_DISCOUNT_CODE_LEN,
            });
        }

        Ok(DiscountCode(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Benefit & Target
// =============================================================================

/// What the discount gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountBenefit {
    /// Share of the qualifying subtotal.
    Percentage(Percentage),
    /// Flat amount, capped at the qualifying subtotal.
    FixedAmount(Money),
    /// Waives shipping; contributes no monetary discount.
    FreeShipping,
}

/// Which cart lines the discount looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountTarget {
    AllLines,
    /// Group membership is resolved upstream; every line qualifies.
    CustomerGroups,
    Products(BTreeSet<String>),
    Categories(BTreeSet<String>),
    Unsupported(UnsupportedTarget),
}

/// Targets that exist in storage but have no resolution path here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedTarget {
    Collections,
}

// =============================================================================
// Extensions
// =============================================================================

/// Current extension document version.
pub const EXTENSIONS_VERSION: u32 = 1;

/// Typed secondary rules carried in the `metadata` column.
///
/// Stored as `{"version": 1, "bundle": {"min_quantity": 3}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscountExtensions {
    pub bundle: Option<BundleRule>,
}

/// Minimum number of qualifying units before the discount applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleRule {
    pub min_quantity: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtensionsDocument {
    #[serde(default = "current_version")]
    version: u32,
    #[serde(default)]
    bundle: Option<BundleRule>,
}

fn current_version() -> u32 {
    EXTENSIONS_VERSION
}

impl DiscountExtensions {
    /// Parses and validates the metadata column.
    ///
    /// NULL, blank and JSON `null` mean "no extensions".
    pub fn parse(metadata: Option<&str>) -> Result<Self, ValidationError> {
        let raw = match metadata.map(str::trim) {
            None | Some("") | Some("null") => return Ok(Self::default()),
            Some(raw) => raw,
        };

        let document: ExtensionsDocument =
            serde_json::from_str(raw).map_err(|e| ValidationError::InvalidFormat {
                field: "metadata".to_string(),
                reason: e.to_string(),
            })?;

        if document.version != EXTENSIONS_VERSION {
            return Err(ValidationError::InvalidFormat {
                field: "metadata".to_string(),
                reason: format!("unsupported extensions version {}", document.version),
            });
        }

        if let Some(bundle) = document.bundle {
            if bundle.min_quantity < 1 {
                return Err(ValidationError::MustBePositive {
                    field: "metadata.bundle.min_quantity".to_string(),
                });
            }
        }

        Ok(DiscountExtensions {
            bundle: document.bundle,
        })
    }

    /// Serializes back to the stored form; `None` when there is nothing to store.
    pub fn to_metadata(&self) -> Option<String> {
        self.bundle.map(|bundle| {
            serde_json::json!({
                "version": EXTENSIONS_VERSION,
                "bundle": { "min_quantity": bundle.min_quantity },
            })
            .to_string()
        })
    }
}

// =============================================================================
// Stored Record
// =============================================================================

/// A `discounts` row as stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiscountRecord {
    pub id: String,
    /// NULL means automatic-only.
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub scope: DiscountScope,
    /// Hundredths: 1000 = 10.00% or 10.00 currency units.
    pub value: i64,
    pub min_subtotal_cents: Option<i64>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    #[ts(as = "Option<String>")]
    pub starts_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub ends_at: Option<DateTime<Utc>>,
    pub is_automatic: bool,
    pub status: DiscountStatus,
    pub metadata: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl DiscountRecord {
    /// Builds the typed discount from the row and its association ids.
    pub fn into_discount(
        self,
        product_ids: impl IntoIterator<Item = String>,
        category_ids: impl IntoIterator<Item = String>,
    ) -> Result<Discount, ValidationError> {
        let benefit = match self.discount_type {
            DiscountType::Percentage => {
                if !(0..=10_000).contains(&self.value) {
                    return Err(ValidationError::OutOfRange {
                        field: "value".to_string(),
                        min: 0,
                        max: 10_000,
                    });
                }
                DiscountBenefit::Percentage(Percentage::from_hundredths(self.value as u32))
            }
            DiscountType::FixedAmount => {
                if self.value < 0 {
                    return Err(ValidationError::MustNotBeNegative {
                        field: "value".to_string(),
                    });
                }
                DiscountBenefit::FixedAmount(Money::from_cents(self.value))
            }
            DiscountType::FreeShipping => DiscountBenefit::FreeShipping,
        };

        let target = match self.scope {
            DiscountScope::All => DiscountTarget::AllLines,
            DiscountScope::CustomerGroups => DiscountTarget::CustomerGroups,
            DiscountScope::Products => DiscountTarget::Products(product_ids.into_iter().collect()),
            DiscountScope::Categories => {
                DiscountTarget::Categories(category_ids.into_iter().collect())
            }
            DiscountScope::Collections => {
                DiscountTarget::Unsupported(UnsupportedTarget::Collections)
            }
        };

        if matches!(self.min_subtotal_cents, Some(min) if min < 0) {
            return Err(ValidationError::MustNotBeNegative {
                field: "min_subtotal_cents".to_string(),
            });
        }

        let code = self
            .code
            .as_deref()
            .map(DiscountCode::parse)
            .transpose()?;

        Ok(Discount {
            id: self.id,
            code,
            benefit,
            target,
            min_subtotal: self.min_subtotal_cents.map(Money::from_cents),
            usage: UsageCounter {
                limit: self.usage_limit,
                count: self.usage_count,
            },
            window: ActiveWindow {
                starts_at: self.starts_at,
                ends_at: self.ends_at,
            },
            is_automatic: self.is_automatic,
            status: self.status,
            extensions: DiscountExtensions::parse(self.metadata.as_deref())?,
        })
    }
}

// =============================================================================
// Discount
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCounter {
    pub limit: Option<i64>,
    pub count: i64,
}

impl UsageCounter {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.limit, Some(limit) if self.count >= limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveWindow {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl ActiveWindow {
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), InapplicableReason> {
        if matches!(self.starts_at, Some(start) if now < start) {
            return Err(InapplicableReason::NotStarted);
        }
        if matches!(self.ends_at, Some(end) if now > end) {
            return Err(InapplicableReason::Expired);
        }
        Ok(())
    }
}

/// A validated discount definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discount {
    pub id: String,
    pub code: Option<DiscountCode>,
    pub benefit: DiscountBenefit,
    pub target: DiscountTarget,
    pub min_subtotal: Option<Money>,
    pub usage: UsageCounter,
    pub window: ActiveWindow,
    pub is_automatic: bool,
    pub status: DiscountStatus,
    pub extensions: DiscountExtensions,
}

impl Discount {
    pub fn discount_type(&self) -> DiscountType {
        match self.benefit {
            DiscountBenefit::Percentage(_) => DiscountType::Percentage,
            DiscountBenefit::FixedAmount(_) => DiscountType::FixedAmount,
            DiscountBenefit::FreeShipping => DiscountType::FreeShipping,
        }
    }

    /// Code if it has one, else the id. Used in messages.
    pub fn label(&self) -> String {
        self.code
            .as_ref()
            .map(|code| code.as_str().to_string())
            .unwrap_or_else(|| self.id.clone())
    }

    /// Status, window, target support and usage limit.
    ///
    /// Says nothing about the cart; see [`crate::evaluator::evaluate`].
    pub fn check_eligible(&self, now: DateTime<Utc>) -> Result<(), InapplicableReason> {
        if self.status != DiscountStatus::Active {
            return Err(InapplicableReason::NotActive);
        }
        self.window.check(now)?;
        if matches!(self.target, DiscountTarget::Unsupported(_)) {
            return Err(InapplicableReason::UnsupportedScope);
        }
        if self.usage.is_exhausted() {
            return Err(InapplicableReason::UsageLimitReached);
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(discount_type: DiscountType, scope: DiscountScope, value: i64) -> DiscountRecord {
        let now = Utc::now();
        DiscountRecord {
            id: "disc-1".to_string(),
            code: Some("save5".to_string()),
            discount_type,
            scope,
            value,
            min_subtotal_cents: None,
            usage_limit: None,
            usage_count: 0,
            starts_at: None,
            ends_at: None,
            is_automatic: false,
            status: DiscountStatus::Active,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(DiscountCode::parse(" summer\t sale ").unwrap().as_str(), "SUMMER SALE");
        assert!(matches!(
            DiscountCode::parse("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            DiscountCode::parse(&"X".repeat(65)),
            Err(ValidationError::TooLong { max: 64, .. })
        ));
    }

    #[test]
    fn test_record_conversion() {
        let discount = record(DiscountType::Percentage, DiscountScope::Products, 1000)
            .into_discount(vec!["p1".to_string()], vec![])
            .unwrap();

        assert_eq!(
            discount.benefit,
            DiscountBenefit::Percentage(Percentage::from_hundredths(1000))
        );
        assert_eq!(
            discount.target,
            DiscountTarget::Products(BTreeSet::from(["p1".to_string()]))
        );
        assert_eq!(discount.code.as_ref().map(|c| c.as_str()), Some("SAVE5"));
    }

    #[test]
    fn test_collections_become_unsupported() {
        let discount = record(DiscountType::FixedAmount, DiscountScope::Collections, 500)
            .into_discount(vec![], vec![])
            .unwrap();
        assert_eq!(
            discount.target,
            DiscountTarget::Unsupported(UnsupportedTarget::Collections)
        );
        assert_eq!(
            discount.check_eligible(Utc::now()),
            Err(InapplicableReason::UnsupportedScope)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(record(DiscountType::Percentage, DiscountScope::All, 10_001)
            .into_discount(vec![], vec![])
            .is_err());
        assert!(record(DiscountType::FixedAmount, DiscountScope::All, -1)
            .into_discount(vec![], vec![])
            .is_err());
    }

    #[test]
    fn test_extensions_parsing() {
        assert_eq!(DiscountExtensions::parse(None).unwrap(), DiscountExtensions::default());
        assert_eq!(DiscountExtensions::parse(Some("  ")).unwrap(), DiscountExtensions::default());

        let parsed = DiscountExtensions::parse(Some(r#"{"version":1,"bundle":{"min_quantity":3}}"#))
            .unwrap();
        assert_eq!(parsed.bundle, Some(BundleRule { min_quantity: 3 }));
        assert_eq!(
            DiscountExtensions::parse(parsed.to_metadata().as_deref()).unwrap(),
            parsed
        );

        assert!(DiscountExtensions::parse(Some(r#"{"version":2}"#)).is_err());
        assert!(DiscountExtensions::parse(Some(r#"{"bundle":{"min_quantity":0}}"#)).is_err());
        assert!(DiscountExtensions::parse(Some(r#"{"bundleMinQty":3}"#)).is_err());
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let mut discount = record(DiscountType::Percentage, DiscountScope::All, 1000)
            .into_discount(vec![], vec![])
            .unwrap();
        assert_eq!(discount.check_eligible(now), Ok(()));

        discount.status = DiscountStatus::Draft;
        assert_eq!(discount.check_eligible(now), Err(InapplicableReason::NotActive));
        discount.status = DiscountStatus::Active;

        discount.window.starts_at = Some(now + Duration::hours(1));
        assert_eq!(discount.check_eligible(now), Err(InapplicableReason::NotStarted));
        discount.window.starts_at = None;

        discount.window.ends_at = Some(now - Duration::hours(1));
        assert_eq!(discount.check_eligible(now), Err(InapplicableReason::Expired));
        discount.window.ends_at = None;

        discount.usage = UsageCounter {
            limit: Some(1),
            count: 1,
        };
        assert_eq!(
            discount.check_eligible(now),
            Err(InapplicableReason::UsageLimitReached)
        );
    }
}
