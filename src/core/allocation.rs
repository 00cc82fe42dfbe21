use rust_decimal::Decimal;

use super::calendar::{ActiveWindow, YearMonth};
use super::types::{CustomMonths, Frequency};

/// Amount an instrument attributes to `target`, or zero when the window is
/// inactive or the frequency does not pay in that month.
///
/// Quarterly and semi-yearly cycles are anchored to the start month rather than
/// calendar quarters, and missed cycles are never caught up.
pub fn allocate(
    amount: Decimal,
    frequency: Frequency,
    window: ActiveWindow,
    custom_months: &CustomMonths,
    target: YearMonth,
) -> Decimal {
    if !window.is_active(target) {
        return Decimal::ZERO;
    }

    let start = window.start_month();
    let pays = match frequency {
        Frequency::Monthly => true,
        Frequency::Quarterly => pays_every(start, target, 3),
        Frequency::SemiYearly => pays_every(start, target, 6),
        Frequency::Yearly => target.month() == start.month(),
        Frequency::Custom => custom_months.contains(target.month()),
        Frequency::OneTime => target == start,
    };

    if pays { amount } else { Decimal::ZERO }
}

fn pays_every(start: YearMonth, target: YearMonth, cycle: i64) -> bool {
    let elapsed = target.months_since(start);
    elapsed >= 0 && elapsed % cycle == 0
}
