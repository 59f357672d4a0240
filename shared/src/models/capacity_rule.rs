//! Capacity Rule Model

use serde::{Deserialize, Serialize};

/// Capacity rule entity (席位准入规则, aka order group)
///
/// Caps how many orders an offering admits. An order in a binding state
/// (or in TO_OWN) occupies `seats` of the rule it was admitted under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacityRule {
    pub id: String,
    /// Offering this rule restricts
    pub offering_id: String,
    /// Total seats the rule admits
    pub nb_seats: u32,
    pub is_active: bool,
    /// Window start (Unix millis, open when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Window end (Unix millis, open when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    /// Discount granted to admitted orders (percent, 10 = 10% off)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u32>,
    /// Tie-break order when several rules are enabled (lowest first)
    pub position: u32,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

impl CapacityRule {
    pub fn new(id: impl Into<String>, offering_id: impl Into<String>, nb_seats: u32) -> Self {
        Self {
            id: id.into(),
            offering_id: offering_id.into(),
            nb_seats,
            is_active: true,
            start: None,
            end: None,
            discount_percent: None,
            position: 0,
            created_at: crate::util::now_millis(),
        }
    }

    /// Active and inside the admission window. Either bound may be open.
    pub fn is_enabled(&self, now: i64) -> bool {
        self.is_active
            && self.start.is_none_or(|start| now >= start)
            && self.end.is_none_or(|end| now <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_are_inclusive_and_optional() {
        let mut rule = CapacityRule::new("rule-1", "off-1", 5);
        assert!(rule.is_enabled(0));

        rule.start = Some(100);
        rule.end = Some(200);
        assert!(!rule.is_enabled(99));
        assert!(rule.is_enabled(100));
        assert!(rule.is_enabled(200));
        assert!(!rule.is_enabled(201));

        rule.end = None;
        assert!(rule.is_enabled(i64::MAX));

        rule.is_active = false;
        assert!(!rule.is_enabled(150));
    }
}
