use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::calendar::{ActiveWindow, YearMonth};
use super::types::IncomeInstrument;

/// Amount and window in force for one income in one target month.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EffectiveTerms {
    pub amount: Decimal,
    pub window: ActiveWindow,
    pub is_future_amount: bool,
}

/// Window of the current amount once a change is scheduled: it always ends in
/// the month before `future_start`, whatever end date the income itself stores.
pub fn truncate_before_change(start: NaiveDate, future_start: NaiveDate) -> ActiveWindow {
    let end = YearMonth::from_date(future_start).previous().last_day();
    ActiveWindow::new(start, Some(end))
}

pub fn effective_terms(income: &IncomeInstrument, target: YearMonth) -> EffectiveTerms {
    let current = EffectiveTerms {
        amount: income.amount,
        window: income.window(),
        is_future_amount: false,
    };

    let Some(change) = income.future_change.as_ref().filter(|c| c.change_flag) else {
        return current;
    };
    let Some(future_start) = change.future_start_date else {
        tracing::warn!(
            income = %income.name,
            "future change flagged without a start date, ignoring it"
        );
        return current;
    };

    if target >= YearMonth::from_date(future_start) {
        EffectiveTerms {
            // An absent future amount carries the current one forward.
            amount: change.future_amount.unwrap_or(income.amount),
            window: ActiveWindow::new(future_start, change.future_end_date),
            is_future_amount: true,
        }
    } else {
        EffectiveTerms {
            window: truncate_before_change(income.start_date, future_start),
            ..current
        }
    }
}
