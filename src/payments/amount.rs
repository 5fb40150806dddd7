//! Amount and installment renderings
//!
//! Every mapper formats amounts through these helpers so rounding is the same
//! across banks.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{GatewayError, GatewayResult};
use crate::payments::types::Bank;

fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Minor units: round to two decimals, then multiply by 100.
///
/// `100` becomes `10000`, `10.01` becomes `1001`. Amounts whose minor units
/// do not fit an `i64` are rejected.
pub fn amount_format(amount: Decimal) -> GatewayResult<i64> {
    round2(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.trunc().to_i64())
        .ok_or_else(|| GatewayError::invalid_order(format!("amount {} is out of range", amount)))
}

/// Major units without trailing zeros: `100`, `10.01`, `10.5`
pub fn amount_plain(amount: Decimal) -> String {
    round2(amount).normalize().to_string()
}

/// Major units with exactly two decimals: `100.00`
pub fn amount_fixed(amount: Decimal) -> String {
    let mut rounded = round2(amount);
    rounded.rescale(2);
    rounded.to_string()
}

/// Parse an amount echoed back by a bank. Accepts both `.` and `,` as
/// decimal separator.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    raw.trim().replace(',', ".").parse::<Decimal>().ok()
}

/// Parse a minor-unit amount echoed back by a bank (`1001` is `10.01`).
pub fn parse_minor_amount(raw: &str) -> Option<Decimal> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .map(|minor| Decimal::new(minor, 2))
}

/// Installment literal sent to the bank. A count of 0 or 1 is a single
/// payment and collapses to the bank's no-installment literal.
pub fn installment_literal(bank: Bank, installment: u32) -> String {
    if installment > 1 {
        return installment.to_string();
    }
    match bank {
        Bank::Est | Bank::Garanti | Bank::Inter => String::new(),
        Bank::Kuveyt | Bank::VakifBank | Bank::PayFor => "0".to_string(),
    }
}
