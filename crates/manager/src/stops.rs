//! Stop-loss rule.

use rust_decimal::Decimal;

use crate::types::StopDecision;

/// Signed percent change of `bid` against `cost_basis`.
///
/// Returns `None` unless `cost_basis` is strictly positive.
pub fn loss_percent(bid: Decimal, cost_basis: Decimal) -> Option<Decimal> {
    if cost_basis <= Decimal::ZERO {
        return None;
    }
    Some((bid - cost_basis) / cost_basis * Decimal::ONE_HUNDRED)
}

/// Compare a bid with the cost basis.
///
/// A breach is `loss_percent <= -stop_loss_pct`. Missing or non-positive
/// inputs give [`StopDecision::Unknown`] so the caller retries next tick
/// instead of treating the position as safe.
pub fn evaluate(
    bid: Option<Decimal>,
    cost_basis: Option<Decimal>,
    stop_loss_pct: Decimal,
) -> StopDecision {
    let (Some(bid), Some(cost_basis)) = (bid, cost_basis) else {
        return StopDecision::Unknown;
    };
    if bid <= Decimal::ZERO {
        return StopDecision::Unknown;
    }
    let Some(loss_pct) = loss_percent(bid, cost_basis) else {
        return StopDecision::Unknown;
    };

    if loss_pct <= -stop_loss_pct {
        tracing::warn!(
            %bid,
            %cost_basis,
            %loss_pct,
            threshold = %stop_loss_pct,
            "Stop-loss breached"
        );
        StopDecision::Breach { loss_pct }
    } else {
        tracing::debug!(%bid, %cost_basis, %loss_pct, "Within stop-loss");
        StopDecision::Hold { loss_pct }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn breach_at_minus_28() {
        let decision = evaluate(Some(dec!(1.80)), Some(dec!(2.50)), dec!(25));
        assert_eq!(decision, StopDecision::Breach { loss_pct: dec!(-28) });
    }

    #[test]
    fn hold_at_minus_24() {
        let decision = evaluate(Some(dec!(1.90)), Some(dec!(2.50)), dec!(25));
        assert_eq!(decision, StopDecision::Hold { loss_pct: dec!(-24) });
        assert!(!decision.is_breach());
    }

    #[test]
    fn exactly_at_threshold_breaches() {
        let decision = evaluate(Some(dec!(1.875)), Some(dec!(2.50)), dec!(25));
        assert!(decision.is_breach());
    }

    #[test]
    fn gains_hold() {
        let decision = evaluate(Some(dec!(3.00)), Some(dec!(2.50)), dec!(10));
        assert_eq!(decision, StopDecision::Hold { loss_pct: dec!(20) });
    }

    #[test]
    fn loss_percent_formula() {
        assert_eq!(loss_percent(dec!(9.12), dec!(11.40)), Some(dec!(-20)));
        assert_eq!(loss_percent(dec!(11.40), dec!(11.40)), Some(dec!(0)));
        assert_eq!(loss_percent(dec!(1), dec!(0)), None);
    }

    #[test]
    fn invalid_inputs_are_unknown() {
        assert_eq!(evaluate(None, Some(dec!(2.50)), dec!(25)), StopDecision::Unknown);
        assert_eq!(evaluate(Some(dec!(1.80)), None, dec!(25)), StopDecision::Unknown);
        assert_eq!(
            evaluate(Some(dec!(0)), Some(dec!(2.50)), dec!(25)),
            StopDecision::Unknown
        );
        assert_eq!(
            evaluate(Some(dec!(1.80)), Some(dec!(-2.50)), dec!(25)),
            StopDecision::Unknown
        );
    }
}
