//! Seat capacity allocation
//!
//! Offerings carry an ordered list of capacity rules (order groups); each
//! rule caps the seats it admits. Orders in a binding state consume seats,
//! and `to_own` reservations consume seats on top of that. The counts are
//! point-in-time queries with no enclosing lock, so two admissions racing
//! each other can both read a free seat; admission is a best-effort gate,
//! not a hard reservation.

use shared::models::{CapacityRule, Offering};
use shared::order::OrderState;
use thiserror::Error;
use tracing::debug;

use crate::storage::{LedgerStorage, StorageError};

/// Capacity errors
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("offering {offering_id} cannot seat {requested} more")]
    SeatsExhausted {
        offering_id: String,
        requested: u32,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Gates order admission on per-rule seat budgets
#[derive(Clone)]
pub struct CapacityAllocator {
    storage: LedgerStorage,
}

impl CapacityAllocator {
    pub fn new(storage: LedgerStorage) -> Self {
        Self { storage }
    }

    /// Enabled rules for an offering, ordered by position.
    ///
    /// Rules sharing a position keep their identifier order, so the result
    /// is deterministic.
    pub fn find_actives(&self, offering_id: &str) -> Result<Vec<CapacityRule>, CapacityError> {
        let now = shared::util::now_millis();
        let mut rules: Vec<CapacityRule> = self
            .storage
            .rules_for_offering(offering_id)?
            .into_iter()
            .filter(|rule| rule.is_enabled(now))
            .collect();
        rules.sort_by_key(|rule| rule.position);
        Ok(rules)
    }

    /// Seats still available under a rule right now.
    ///
    /// Can go negative when admissions raced past the budget.
    pub fn available_seats(&self, rule: &CapacityRule) -> Result<i64, CapacityError> {
        let mut taken: i64 = 0;
        for order in self.storage.orders_for_rule(&rule.id)? {
            if order.state.is_binding() || order.state == OrderState::ToOwn {
                taken += i64::from(order.seats);
            }
        }
        Ok(i64::from(rule.nb_seats) - taken)
    }

    /// Admit an order requesting `seats` onto an offering.
    ///
    /// Returns the first rule (by position) with enough seats left, `None`
    /// when the offering has no enabled rules at all (unrestricted), and
    /// `SeatsExhausted` when rules exist but none can take the request.
    pub fn admit(
        &self,
        offering_id: &str,
        seats: u32,
    ) -> Result<Option<CapacityRule>, CapacityError> {
        let actives = self.find_actives(offering_id)?;
        if actives.is_empty() {
            return Ok(None);
        }
        for rule in actives {
            let available = self.available_seats(&rule)?;
            if available >= i64::from(seats) {
                debug!(offering_id, rule_id = %rule.id, available, seats, "admission granted");
                return Ok(Some(rule));
            }
        }
        Err(CapacityError::SeatsExhausted {
            offering_id: offering_id.to_string(),
            requested: seats,
        })
    }

    /// Pick the organization to run an admitted order.
    ///
    /// Among the organizations attached to the offering, takes the one with
    /// the fewest binding orders on the same offering; ties fall to the
    /// ascending organization identifier.
    pub fn assign_organization(
        &self,
        offering: &Offering,
    ) -> Result<Option<String>, CapacityError> {
        if offering.organizations.is_empty() {
            return Ok(None);
        }

        let orders = self.storage.orders_for_offering(&offering.id)?;
        let mut candidates = offering.organizations.clone();
        candidates.sort();

        let least_loaded = candidates.into_iter().min_by_key(|org| {
            orders
                .iter()
                .filter(|order| {
                    order.state.is_binding() && order.organization_id.as_deref() == Some(org)
                })
                .count()
        });
        Ok(least_loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::order::Order;

    fn allocator() -> (CapacityAllocator, LedgerStorage) {
        let storage = LedgerStorage::open_in_memory().unwrap();
        (CapacityAllocator::new(storage.clone()), storage)
    }

    fn admitted_order(rule_id: &str, state: OrderState, seats: u32) -> Order {
        let mut order = Order::new("user", "off-1", Decimal::from(100), "EUR");
        order.state = state;
        order.seats = seats;
        order.capacity_rule_ids = vec![rule_id.to_string()];
        order
    }

    #[test]
    fn actives_are_enabled_rules_by_position() {
        let (allocator, storage) = allocator();
        let mut first = CapacityRule::new("b-rule", "off-1", 5);
        first.position = 1;
        let mut second = CapacityRule::new("a-rule", "off-1", 5);
        second.position = 2;
        let mut disabled = CapacityRule::new("c-rule", "off-1", 5);
        disabled.is_active = false;
        storage.put_capacity_rule(&first).unwrap();
        storage.put_capacity_rule(&second).unwrap();
        storage.put_capacity_rule(&disabled).unwrap();

        let actives = allocator.find_actives("off-1").unwrap();
        let ids: Vec<&str> = actives.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b-rule", "a-rule"]);
    }

    #[test]
    fn binding_and_to_own_orders_consume_seats() {
        let (allocator, storage) = allocator();
        let rule = CapacityRule::new("rule-1", "off-1", 10);
        storage.put_capacity_rule(&rule).unwrap();

        storage
            .save_order(&admitted_order("rule-1", OrderState::Pending, 2))
            .unwrap();
        storage
            .save_order(&admitted_order("rule-1", OrderState::ToOwn, 3))
            .unwrap();
        // draft 和 canceled 不占座
        storage
            .save_order(&admitted_order("rule-1", OrderState::Draft, 4))
            .unwrap();
        storage
            .save_order(&admitted_order("rule-1", OrderState::Canceled, 4))
            .unwrap();

        assert_eq!(allocator.available_seats(&rule).unwrap(), 5);
    }

    #[test]
    fn admission_takes_first_rule_with_room() {
        let (allocator, storage) = allocator();
        let mut full = CapacityRule::new("rule-1", "off-1", 1);
        full.position = 1;
        let mut open = CapacityRule::new("rule-2", "off-1", 2);
        open.position = 2;
        storage.put_capacity_rule(&full).unwrap();
        storage.put_capacity_rule(&open).unwrap();
        storage
            .save_order(&admitted_order("rule-1", OrderState::Completed, 1))
            .unwrap();

        let admitted = allocator.admit("off-1", 1).unwrap().unwrap();
        assert_eq!(admitted.id, "rule-2");
    }

    #[test]
    fn admission_past_the_budget_fails() {
        let (allocator, storage) = allocator();
        storage
            .put_capacity_rule(&CapacityRule::new("rule-1", "off-1", 1))
            .unwrap();
        storage
            .save_order(&admitted_order("rule-1", OrderState::Validated, 1))
            .unwrap();

        let result = allocator.admit("off-1", 1);
        assert!(matches!(
            result,
            Err(CapacityError::SeatsExhausted { requested: 1, .. })
        ));
    }

    #[test]
    fn no_rules_means_unrestricted() {
        let (allocator, _storage) = allocator();
        assert!(allocator.admit("off-none", 1).unwrap().is_none());
    }

    #[test]
    fn organization_with_fewest_binding_orders_wins() {
        let (allocator, storage) = allocator();
        let mut offering = Offering::new("off-1", "C1", "P1", "Course", Decimal::from(100));
        offering.organizations = vec!["org-b".to_string(), "org-a".to_string()];

        let mut busy = Order::new("user", "off-1", Decimal::from(100), "EUR");
        busy.state = OrderState::Pending;
        busy.organization_id = Some("org-a".to_string());
        storage.save_order(&busy).unwrap();

        assert_eq!(
            allocator.assign_organization(&offering).unwrap(),
            Some("org-b".to_string())
        );
    }

    #[test]
    fn organization_ties_break_by_ascending_id() {
        let (allocator, _storage) = allocator();
        let mut offering = Offering::new("off-1", "C1", "P1", "Course", Decimal::from(100));
        offering.organizations = vec!["org-z".to_string(), "org-a".to_string()];

        assert_eq!(
            allocator.assign_organization(&offering).unwrap(),
            Some("org-a".to_string())
        );
    }
}
