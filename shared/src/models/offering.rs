//! Offering Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Offering entity (课程+产品组合)
///
/// The unit orders are placed against: one course paired with one product,
/// with the organizations entitled to deliver it. Admission rules
/// ([`crate::models::CapacityRule`]) attach to an offering by ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offering {
    pub id: String,
    /// Course code (e.g. "DEMO-101")
    pub course_code: String,
    /// Product ID in the catalog
    pub product_id: String,
    /// Title shown on invoices and quotes
    pub title: String,
    /// Catalog price before any capacity-rule discount
    pub price: Decimal,
    /// Organizations attached to this offering, candidates for
    /// auto-assignment at admission
    #[serde(default)]
    pub organizations: Vec<String>,
    /// The product requires a signed training contract before payment
    #[serde(default)]
    pub requires_contract: bool,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

impl Offering {
    pub fn new(
        id: impl Into<String>,
        course_code: impl Into<String>,
        product_id: impl Into<String>,
        title: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            course_code: course_code.into(),
            product_id: product_id.into(),
            title: title.into(),
            price,
            organizations: Vec::new(),
            requires_contract: false,
            created_at: crate::util::now_millis(),
        }
    }
}
