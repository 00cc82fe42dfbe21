mod allocation;
mod calendar;
mod contribution;
mod engine;
mod money;
mod splice;
mod types;

pub use allocation::allocate;
pub use calendar::{ActiveWindow, YearMonth, is_active};
pub use contribution::{
    AgeBand, ContributionBreakdown, ContributionRates, ContributionScheme, DEFAULT_CONTRIBUTOR_AGE,
    DEFAULT_WAGE_CEILING, SchemeError, SubAccount, compute_contribution,
    compute_sub_account_allocation,
};
pub use engine::{ProjectionSettings, month_breakdown, project, run_projection, summarize};
pub use money::round2;
pub use splice::{EffectiveTerms, effective_terms, truncate_before_change};
pub use types::{
    AllocationLine, CustomMonths, ExpenseInstrument, Frequency, FutureChange, IncomeInstrument,
    InstrumentKind, LifecycleCategory, MonthBreakdown, ProjectionPoint, ProjectionSummary,
};
