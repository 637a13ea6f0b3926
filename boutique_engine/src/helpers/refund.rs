use boutique_common::Eur;
use serde::{Deserialize, Serialize};

/// Everything the refund calculation needs to know about one returned item and its order. Callers assemble this
/// from the order projection, the ledger and the return history; the calculation itself touches no storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundInputs {
    /// Total of the order the item belongs to, as originally placed.
    pub order_total: Eur,
    /// Gross price of the returned item (unit price x quantity).
    pub item_price: Eur,
    /// Order-level discount to be split pro rata across items.
    pub order_discount: Eur,
    /// Loyalty euros earned on the whole order, the pool the clawback is drawn from.
    pub loyalty_earned: Eur,
    /// Whether the order was granted a promotional gift for crossing the threshold.
    pub had_promotional_gift: bool,
    pub gift_value: Eur,
    /// The gift threshold in force when the order was placed.
    pub gift_threshold: Eur,
    /// What the order would have totalled without this item (and any previously returned ones).
    pub order_total_after_removal: Eur,
    /// True when an earlier return against this order already clawed the gift back.
    pub gift_already_returned: bool,
}

/// The outcome of [`calculate_refund`]. Every field is frozen into the return request at declaration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundBreakdown {
    /// The item's fair share of the order-level discount.
    pub discount_prorata: Eur,
    /// Item price less its discount share.
    pub net_price: Eur,
    /// Loyalty earned on the order, attributable to this item.
    pub loyalty_to_recover: Eur,
    /// Gift value deducted because the remaining order total fell below the threshold.
    pub gift_deduction: Eur,
    /// What is actually paid out. Never negative.
    pub final_refund: Eur,
}

/// Compute the refundable value of one returned item.
///
/// Deterministic and side-effect free: same inputs, same breakdown, no hidden state. The refund is floored at
/// zero; a clawback larger than the net price never creates a debt.
pub fn calculate_refund(inputs: &RefundInputs) -> RefundBreakdown {
    let discount_prorata = inputs.order_discount.share_of(inputs.item_price, inputs.order_total);
    let net_price = inputs.item_price - discount_prorata;
    let loyalty_to_recover = inputs.loyalty_earned.share_of(inputs.item_price, inputs.order_total);
    let gift_applies = inputs.had_promotional_gift
        && !inputs.gift_already_returned
        && inputs.order_total_after_removal < inputs.gift_threshold;
    let gift_deduction = if gift_applies { inputs.gift_value } else { Eur::default() };
    let final_refund = (net_price - loyalty_to_recover - gift_deduction).max(Eur::default());
    RefundBreakdown { discount_prorata, net_price, loyalty_to_recover, gift_deduction, final_refund }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_inputs() -> RefundInputs {
        RefundInputs {
            order_total: Eur::from_euros(100),
            item_price: Eur::from_euros(40),
            order_discount: Eur::default(),
            loyalty_earned: Eur::default(),
            had_promotional_gift: false,
            gift_value: Eur::default(),
            gift_threshold: Eur::from_euros(69),
            order_total_after_removal: Eur::from_euros(60),
            gift_already_returned: false,
        }
    }

    #[test]
    fn discount_and_loyalty_are_prorated() {
        // 100 € order, 10 € discount, 40 € item, 2 € loyalty earned
        let inputs = RefundInputs {
            order_discount: Eur::from_euros(10),
            loyalty_earned: Eur::from_euros(2),
            ..base_inputs()
        };
        let b = calculate_refund(&inputs);
        assert_eq!(b.discount_prorata, Eur::from_euros(4));
        assert_eq!(b.net_price, Eur::from_euros(36));
        assert_eq!(b.loyalty_to_recover, Eur::from_cents(80));
        assert_eq!(b.gift_deduction, Eur::default());
        assert_eq!(b.final_refund, Eur::from_cents(3520));
    }

    #[test]
    fn gift_clawed_back_when_total_falls_below_threshold() {
        // 75 € order with a gift, returning 20 € drops the total to 55 €, below the 69 € threshold
        let inputs = RefundInputs {
            order_total: Eur::from_euros(75),
            item_price: Eur::from_euros(20),
            had_promotional_gift: true,
            gift_value: Eur::from_euros(8),
            order_total_after_removal: Eur::from_euros(55),
            ..base_inputs()
        };
        let b = calculate_refund(&inputs);
        assert_eq!(b.gift_deduction, Eur::from_euros(8));
        assert_eq!(b.final_refund, Eur::from_euros(12));
    }

    #[test]
    fn gift_kept_when_total_stays_above_threshold() {
        let inputs = RefundInputs {
            order_total: Eur::from_euros(120),
            item_price: Eur::from_euros(20),
            had_promotional_gift: true,
            gift_value: Eur::from_euros(8),
            order_total_after_removal: Eur::from_euros(100),
            ..base_inputs()
        };
        let b = calculate_refund(&inputs);
        assert_eq!(b.gift_deduction, Eur::default());
        assert_eq!(b.final_refund, Eur::from_euros(20));
    }

    #[test]
    fn gift_not_deducted_twice() {
        let inputs = RefundInputs {
            order_total: Eur::from_euros(75),
            item_price: Eur::from_euros(20),
            had_promotional_gift: true,
            gift_value: Eur::from_euros(8),
            order_total_after_removal: Eur::from_euros(55),
            gift_already_returned: true,
            ..base_inputs()
        };
        let b = calculate_refund(&inputs);
        assert_eq!(b.gift_deduction, Eur::default());
    }

    #[test]
    fn refund_is_floored_at_zero() {
        // A gift worth more than the item cannot push the refund negative
        let inputs = RefundInputs {
            order_total: Eur::from_euros(75),
            item_price: Eur::from_euros(5),
            had_promotional_gift: true,
            gift_value: Eur::from_euros(8),
            order_total_after_removal: Eur::from_euros(70 - 5),
            ..base_inputs()
        };
        let b = calculate_refund(&inputs);
        assert_eq!(b.final_refund, Eur::default());
    }

    #[test]
    fn refund_is_deterministic() {
        let inputs = RefundInputs {
            order_discount: Eur::from_cents(999),
            loyalty_earned: Eur::from_cents(137),
            ..base_inputs()
        };
        let first = calculate_refund(&inputs);
        for _ in 0..10 {
            assert_eq!(calculate_refund(&inputs), first);
        }
    }
}
