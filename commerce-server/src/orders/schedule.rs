//! Payment schedule construction
//!
//! A schedule table maps a minimum-total threshold to an ordered list of
//! percentages (summing to 100) plus the due-date offset of each resulting
//! installment. Building a schedule picks the tier with the greatest
//! threshold that is still ≤ the order total, then splits the total across
//! installments. The last installment absorbs the rounding remainder so the
//! installments always sum back to the total exactly, to the cent.
//!
//! The table is validated once at construction and immutable afterwards.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::order::Installment;
use std::collections::BTreeMap;
use thiserror::Error;

use super::money::percent_of;

/// Schedule configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleConfigError {
    /// 没有任何档位的门槛 ≤ 订单总额
    #[error("no schedule tier matches total {0}")]
    NoMatchingTier(Decimal),

    #[error("tier at threshold {threshold}: percentages sum to {sum}, expected 100")]
    InvalidPercentages { threshold: Decimal, sum: u32 },

    #[error("tier at threshold {threshold}: {offsets} due-date offsets for {percents} installments")]
    OffsetsMismatch {
        threshold: Decimal,
        percents: usize,
        offsets: usize,
    },

    #[error("duplicate schedule tier threshold {0}")]
    DuplicateThreshold(Decimal),
}

/// One bracket of the schedule table
#[derive(Debug, Clone)]
pub struct ScheduleTier {
    /// Percentage of the total per installment, in payment order
    pub percents: Vec<u32>,
    /// Due-date offset in days from the freeze date, one per installment
    pub due_offsets: Vec<i64>,
}

/// Validated, immutable schedule table keyed by minimum-total threshold
#[derive(Debug, Clone)]
pub struct ScheduleTiers {
    tiers: BTreeMap<Decimal, ScheduleTier>,
}

impl ScheduleTiers {
    /// Build a table from `(threshold, percentages, due_offsets)` entries.
    ///
    /// Every entry is checked here so a malformed table fails at startup,
    /// never in the middle of an order submission.
    pub fn new(
        entries: Vec<(Decimal, Vec<u32>, Vec<i64>)>,
    ) -> Result<Self, ScheduleConfigError> {
        let mut tiers = BTreeMap::new();
        for (threshold, percents, due_offsets) in entries {
            let sum: u32 = percents.iter().sum();
            if sum != 100 {
                return Err(ScheduleConfigError::InvalidPercentages { threshold, sum });
            }
            if percents.len() != due_offsets.len() {
                return Err(ScheduleConfigError::OffsetsMismatch {
                    threshold,
                    percents: percents.len(),
                    offsets: due_offsets.len(),
                });
            }
            let tier = ScheduleTier {
                percents,
                due_offsets,
            };
            if tiers.insert(threshold, tier).is_some() {
                return Err(ScheduleConfigError::DuplicateThreshold(threshold));
            }
        }
        Ok(Self { tiers })
    }

    /// Default table: totals under 100 are paid up front in full, totals of
    /// 100 and above are split 20/30/30/20 over three months
    pub fn standard() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            Decimal::ZERO,
            ScheduleTier {
                percents: vec![100],
                due_offsets: vec![0],
            },
        );
        tiers.insert(
            Decimal::ONE_HUNDRED,
            ScheduleTier {
                percents: vec![20, 30, 30, 20],
                due_offsets: vec![0, 30, 60, 90],
            },
        );
        Self { tiers }
    }

    /// Tier with the greatest threshold ≤ `total`
    fn select(&self, total: Decimal) -> Option<&ScheduleTier> {
        self.tiers.range(..=total).next_back().map(|(_, tier)| tier)
    }
}

/// Converts a frozen order total into its installment schedule
#[derive(Debug, Clone)]
pub struct PaymentScheduleBuilder {
    tiers: ScheduleTiers,
}

impl PaymentScheduleBuilder {
    pub fn new(tiers: ScheduleTiers) -> Self {
        Self { tiers }
    }

    /// Split `total` into installments due relative to `freeze_date`.
    ///
    /// Each installment is `round(total * pct / 100, 2)` except the last,
    /// which takes whatever remains of the total.
    pub fn build(
        &self,
        total: Decimal,
        currency: &str,
        freeze_date: NaiveDate,
    ) -> Result<Vec<Installment>, ScheduleConfigError> {
        let tier = self
            .tiers
            .select(total)
            .ok_or(ScheduleConfigError::NoMatchingTier(total))?;

        let count = tier.percents.len();
        let mut installments = Vec::with_capacity(count);
        let mut allocated = Decimal::ZERO;
        for (idx, (&pct, &offset)) in tier.percents.iter().zip(&tier.due_offsets).enumerate() {
            let amount = if idx + 1 == count {
                total - allocated
            } else {
                percent_of(total, pct)
            };
            allocated += amount;
            let due_date = freeze_date + chrono::Duration::days(offset);
            installments.push(Installment::new(amount, currency, due_date));
        }
        Ok(installments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn builder() -> PaymentScheduleBuilder {
        PaymentScheduleBuilder::new(ScheduleTiers::standard())
    }

    fn freeze() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn splits_round_totals_exactly() {
        let schedule = builder().build(dec("100.00"), "EUR", freeze()).unwrap();
        let amounts: Vec<Decimal> = schedule.iter().map(|i| i.amount).collect();
        assert_eq!(
            amounts,
            vec![dec("20.00"), dec("30.00"), dec("30.00"), dec("20.00")]
        );
    }

    #[test]
    fn last_installment_absorbs_rounding() {
        // 99.99 picks the up-front tier; force the split tier with 100.01
        let schedule = builder().build(dec("100.01"), "EUR", freeze()).unwrap();
        let sum: Decimal = schedule.iter().map(|i| i.amount).sum();
        assert_eq!(sum, dec("100.01"));
        assert_eq!(schedule[3].amount, dec("20.01"));
    }

    #[test]
    fn installments_always_sum_to_total() {
        for raw in ["0.01", "99.99", "100.00", "333.33", "1047.17", "9999.99"] {
            let total = dec(raw);
            let schedule = builder().build(total, "EUR", freeze()).unwrap();
            let sum: Decimal = schedule.iter().map(|i| i.amount).sum();
            assert_eq!(sum, total, "total {raw}");
        }
    }

    #[test]
    fn threshold_selection_is_greatest_below() {
        let schedule = builder().build(dec("99.99"), "EUR", freeze()).unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].amount, dec("99.99"));

        // 刚好压线取分期档
        let schedule = builder().build(dec("100.00"), "EUR", freeze()).unwrap();
        assert_eq!(schedule.len(), 4);
    }

    #[test]
    fn no_tier_below_total_fails() {
        let tiers = ScheduleTiers::new(vec![(
            Decimal::ONE_HUNDRED,
            vec![50, 50],
            vec![0, 30],
        )])
        .unwrap();
        let result = PaymentScheduleBuilder::new(tiers).build(dec("50.00"), "EUR", freeze());
        assert!(matches!(
            result,
            Err(ScheduleConfigError::NoMatchingTier(_))
        ));
    }

    #[test]
    fn due_dates_follow_tier_offsets() {
        let schedule = builder().build(dec("100.00"), "EUR", freeze()).unwrap();
        let days: Vec<NaiveDate> = schedule.iter().map(|i| i.due_date).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
                NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
            ]
        );
    }

    #[test]
    fn malformed_percentages_rejected_at_construction() {
        let result = ScheduleTiers::new(vec![(Decimal::ZERO, vec![50, 40], vec![0, 30])]);
        assert!(matches!(
            result,
            Err(ScheduleConfigError::InvalidPercentages { sum: 90, .. })
        ));
    }

    #[test]
    fn offset_count_must_match_percentages() {
        let result = ScheduleTiers::new(vec![(Decimal::ZERO, vec![50, 50], vec![0])]);
        assert!(matches!(
            result,
            Err(ScheduleConfigError::OffsetsMismatch {
                percents: 2,
                offsets: 1,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_thresholds_rejected() {
        let result = ScheduleTiers::new(vec![
            (Decimal::ZERO, vec![100], vec![0]),
            (Decimal::ZERO, vec![50, 50], vec![0, 30]),
        ]);
        assert!(matches!(
            result,
            Err(ScheduleConfigError::DuplicateThreshold(_))
        ));
    }
}
