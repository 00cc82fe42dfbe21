use rust_decimal::Decimal;

use super::allocation::allocate;
use super::calendar::YearMonth;
use super::contribution::ContributionScheme;
use super::money::round2;
use super::splice::effective_terms;
use super::types::{
    AllocationLine, ExpenseInstrument, IncomeInstrument, InstrumentKind, MonthBreakdown,
    ProjectionPoint, ProjectionSummary,
};

#[derive(Debug, Clone)]
pub struct ProjectionSettings {
    /// Month 0 of the projection.
    pub anchor: YearMonth,
    pub horizon_months: u32,
    pub starting_balance: Decimal,
    /// Falls back to the scheme's default age when unknown.
    pub contributor_age: Option<u32>,
    pub scheme: ContributionScheme,
}

impl ProjectionSettings {
    pub fn new(anchor: YearMonth, horizon_months: u32, starting_balance: Decimal) -> Self {
        Self {
            anchor,
            horizon_months,
            starting_balance,
            contributor_age: None,
            scheme: ContributionScheme::default(),
        }
    }

    fn month(&self, offset: u32) -> YearMonth {
        self.anchor.offset(i64::from(offset))
    }
}

#[derive(Debug, Clone, Copy)]
struct Allocated {
    effective_gross: Decimal,
    amount: Decimal,
    is_future_amount: bool,
}

fn usable_amount(amount: Decimal, name: &str) -> Decimal {
    if amount.is_sign_negative() && !amount.is_zero() {
        tracing::warn!(instrument = %name, %amount, "negative amount, contributing zero");
        return Decimal::ZERO;
    }
    amount
}

/// Adds one instrument's allocation to a monthly total. An allocation that
/// would overflow the total is dropped with a warning.
fn accumulate(total: Decimal, amount: Decimal, name: &str) -> Decimal {
    total.checked_add(amount).unwrap_or_else(|| {
        tracing::warn!(instrument = %name, %amount, "monthly total overflowed, dropping allocation");
        total
    })
}

fn allocate_income(
    income: &IncomeInstrument,
    target: YearMonth,
    settings: &ProjectionSettings,
) -> Allocated {
    let terms = effective_terms(income, target);
    let gross = usable_amount(terms.amount, &income.name);
    let mut allocated = Allocated {
        effective_gross: gross,
        amount: Decimal::ZERO,
        is_future_amount: terms.is_future_amount,
    };
    if !terms.window.is_active(target) {
        return allocated;
    }

    let net = if !income.subject_to_contribution {
        gross
    } else if terms.is_future_amount {
        // Stored net figures only describe the current amount.
        settings
            .scheme
            .compute_contribution(gross, settings.contributor_age)
            .net_take_home
    } else {
        match income.net_amount {
            Some(stored) => usable_amount(stored, &income.name),
            None => {
                settings
                    .scheme
                    .compute_contribution(gross, settings.contributor_age)
                    .net_take_home
            }
        }
    };

    allocated.amount = allocate(
        net,
        income.frequency,
        terms.window,
        &income.custom_months,
        target,
    );
    allocated
}

fn allocate_expense(expense: &ExpenseInstrument, target: YearMonth) -> Decimal {
    allocate(
        usable_amount(expense.amount, &expense.name),
        expense.frequency,
        expense.window(),
        &expense.custom_months,
        target,
    )
}

fn projectable<'a>(
    incomes: &'a [IncomeInstrument],
    expenses: &'a [ExpenseInstrument],
) -> (Vec<&'a IncomeInstrument>, Vec<&'a ExpenseInstrument>) {
    (
        incomes.iter().filter(|i| i.is_projectable()).collect(),
        expenses.iter().filter(|e| e.is_projectable()).collect(),
    )
}

/// Month-by-month cash flow from the current calendar month with the default
/// contribution scheme and contributor age.
pub fn project(
    incomes: &[IncomeInstrument],
    expenses: &[ExpenseInstrument],
    horizon_months: u32,
    starting_balance: Decimal,
) -> Vec<ProjectionPoint> {
    let settings = ProjectionSettings::new(YearMonth::current(), horizon_months, starting_balance);
    run_projection(incomes, expenses, &settings)
}

pub fn run_projection(
    incomes: &[IncomeInstrument],
    expenses: &[ExpenseInstrument],
    settings: &ProjectionSettings,
) -> Vec<ProjectionPoint> {
    let (incomes, expenses) = projectable(incomes, expenses);
    tracing::debug!(
        anchor = %settings.anchor,
        horizon = settings.horizon_months,
        incomes = incomes.len(),
        expenses = expenses.len(),
        "running projection"
    );

    let mut points = Vec::with_capacity(settings.horizon_months as usize);
    let mut cumulative = round2(settings.starting_balance);

    for offset in 0..settings.horizon_months {
        let target = settings.month(offset);
        let income = round2(incomes.iter().fold(Decimal::ZERO, |total, i| {
            accumulate(total, allocate_income(i, target, settings).amount, &i.name)
        }));
        let expense = round2(expenses.iter().fold(Decimal::ZERO, |total, e| {
            accumulate(total, allocate_expense(e, target), &e.name)
        }));
        let monthly_balance = income - expense;
        cumulative = cumulative.checked_add(monthly_balance).unwrap_or_else(|| {
            tracing::warn!(month = %target, "cumulative balance overflowed, saturating");
            cumulative.saturating_add(monthly_balance)
        });

        points.push(ProjectionPoint {
            month: target,
            month_label: target.label(),
            income,
            expense,
            monthly_balance: round2(monthly_balance),
            cumulative_balance: round2(cumulative),
        });
    }

    points
}

/// Per-instrument detail behind a single projection month.
pub fn month_breakdown(
    incomes: &[IncomeInstrument],
    expenses: &[ExpenseInstrument],
    settings: &ProjectionSettings,
    offset: u32,
) -> MonthBreakdown {
    let (incomes, expenses) = projectable(incomes, expenses);
    let target = settings.month(offset);

    let mut lines = Vec::with_capacity(incomes.len() + expenses.len());
    for income in incomes {
        let allocated = allocate_income(income, target, settings);
        lines.push(AllocationLine {
            name: income.name.clone(),
            kind: InstrumentKind::Income,
            effective_gross: allocated.effective_gross,
            allocated: allocated.amount,
            is_future_amount: allocated.is_future_amount,
        });
    }
    for expense in expenses {
        lines.push(AllocationLine {
            name: expense.name.clone(),
            kind: InstrumentKind::Expense,
            effective_gross: usable_amount(expense.amount, &expense.name),
            allocated: allocate_expense(expense, target),
            is_future_amount: false,
        });
    }

    let total = |kind: InstrumentKind| {
        round2(
            lines
                .iter()
                .filter(|line| line.kind == kind)
                .fold(Decimal::ZERO, |sum, line| {
                    accumulate(sum, line.allocated, &line.name)
                }),
        )
    };

    MonthBreakdown {
        month: target,
        month_label: target.label(),
        income: total(InstrumentKind::Income),
        expense: total(InstrumentKind::Expense),
        lines,
    }
}

pub fn summarize(points: &[ProjectionPoint], starting_balance: Decimal) -> ProjectionSummary {
    let total_income = points
        .iter()
        .fold(Decimal::ZERO, |total, p| total.saturating_add(p.income));
    let total_expense = points
        .iter()
        .fold(Decimal::ZERO, |total, p| total.saturating_add(p.expense));
    let lowest = points
        .iter()
        .min_by(|a, b| a.cumulative_balance.cmp(&b.cumulative_balance));

    ProjectionSummary {
        months: points.len(),
        total_income: round2(total_income),
        total_expense: round2(total_expense),
        net_change: round2(total_income.saturating_sub(total_expense)),
        ending_balance: points
            .last()
            .map(|p| p.cumulative_balance)
            .unwrap_or_else(|| round2(starting_balance)),
        lowest_balance: lowest
            .map(|p| p.cumulative_balance)
            .unwrap_or_else(|| round2(starting_balance)),
        lowest_balance_month: lowest.map(|p| p.month),
        first_negative_month: points
            .iter()
            .find(|p| p.cumulative_balance.is_sign_negative() && !p.cumulative_balance.is_zero())
            .map(|p| p.month),
    }
}
