use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::calendar::{ActiveWindow, YearMonth};
use super::money::{lenient_amount, lenient_optional_amount};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Monthly,
    Quarterly,
    #[serde(alias = "semiYearly", alias = "semi_yearly", alias = "half-yearly")]
    SemiYearly,
    #[serde(alias = "annually", alias = "annual")]
    Yearly,
    Custom,
    #[serde(alias = "oneTime", alias = "one_time", alias = "once")]
    OneTime,
}

/// Calendar months (1-12) a custom-frequency instrument pays in.
///
/// Deserialization never fails: any malformed input collapses to the empty
/// set, which allocates nothing rather than falling back to monthly.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CustomMonths(BTreeSet<u32>);

impl CustomMonths {
    pub fn new<I: IntoIterator<Item = u32>>(months: I) -> Self {
        let set = months.into_iter().collect::<BTreeSet<_>>();
        if set.iter().all(|m| (1..=12).contains(m)) {
            Self(set)
        } else {
            Self::default()
        }
    }

    pub fn contains(&self, month: u32) -> bool {
        self.0.contains(&month)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_value(value: &Value) -> Self {
        match parse_custom_months(value) {
            Some(months) => months,
            None => {
                tracing::warn!(raw = %value, "unparsable custom months, selecting none");
                Self::default()
            }
        }
    }
}

fn parse_month(value: &Value) -> Option<u32> {
    let month = match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse::<u32>().ok()?,
        _ => return None,
    };
    (1..=12).contains(&month).then_some(month)
}

fn parse_custom_months(value: &Value) -> Option<CustomMonths> {
    match value {
        Value::Null => Some(CustomMonths::default()),
        Value::Array(items) => {
            let months = items.iter().map(parse_month).collect::<Option<BTreeSet<_>>>()?;
            Some(CustomMonths(months))
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(CustomMonths::default());
            }
            if trimmed.starts_with('[') {
                let nested = serde_json::from_str::<Value>(trimmed).ok()?;
                return match nested {
                    Value::Array(_) => parse_custom_months(&nested),
                    _ => None,
                };
            }
            let months = trimmed
                .split(',')
                .map(|part| parse_month(&Value::String(part.to_string())))
                .collect::<Option<BTreeSet<_>>>()?;
            Some(CustomMonths(months))
        }
        _ => None,
    }
}

impl<'de> Deserialize<'de> for CustomMonths {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(CustomMonths::from_value(&value))
    }
}

/// Only `CurrentRecurring` instruments take part in the monthly projection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleCategory {
    #[serde(alias = "currentRecurring", alias = "current_recurring")]
    CurrentRecurring,
    #[serde(alias = "oneOff", alias = "one_off")]
    OneOff,
    Planned,
    Historical,
    #[default]
    #[serde(other)]
    Other,
}

/// Scheduled change of an income's amount from `future_start_date` onwards.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FutureChange {
    #[serde(deserialize_with = "flag_or_false")]
    pub change_flag: bool,
    #[serde(deserialize_with = "lenient_optional_amount")]
    pub future_amount: Option<Decimal>,
    pub future_start_date: Option<NaiveDate>,
    pub future_end_date: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

fn lenient_flag<'de, D: Deserializer<'de>>(
    deserializer: D,
    fallback: bool,
) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let flag = match &value {
        Value::Bool(flag) => Some(*flag),
        Value::Null => Some(fallback),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    };
    Ok(flag.unwrap_or_else(|| {
        tracing::warn!(%value, fallback, "unparsable flag, using default");
        fallback
    }))
}

fn flag_or_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    lenient_flag(deserializer, true)
}

fn flag_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    lenient_flag(deserializer, false)
}

/// `null` or a non-string category counts as `Other`.
fn lenient_category<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LifecycleCategory, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(LifecycleCategory::deserialize(value).unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeInstrument {
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: Decimal,
    pub frequency: Frequency,
    #[serde(default)]
    pub custom_months: CustomMonths,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_category")]
    pub lifecycle_category: LifecycleCategory,
    #[serde(default = "default_true", deserialize_with = "flag_or_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub subject_to_contribution: bool,
    /// Gross minus the employee contribution, valid for the current window only.
    #[serde(default, deserialize_with = "lenient_optional_amount")]
    pub net_amount: Option<Decimal>,
    #[serde(default)]
    pub future_change: Option<FutureChange>,
}

impl IncomeInstrument {
    pub fn window(&self) -> ActiveWindow {
        ActiveWindow::new(self.start_date, self.end_date)
    }

    pub fn is_projectable(&self) -> bool {
        self.lifecycle_category == LifecycleCategory::CurrentRecurring && self.is_active
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInstrument {
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: Decimal,
    pub frequency: Frequency,
    #[serde(default)]
    pub custom_months: CustomMonths,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_category")]
    pub lifecycle_category: LifecycleCategory,
    #[serde(default = "default_true", deserialize_with = "flag_or_true")]
    pub is_active: bool,
}

impl ExpenseInstrument {
    pub fn window(&self) -> ActiveWindow {
        ActiveWindow::new(self.start_date, self.end_date)
    }

    pub fn is_projectable(&self) -> bool {
        self.lifecycle_category == LifecycleCategory::CurrentRecurring && self.is_active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub month: YearMonth,
    pub month_label: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub monthly_balance: Decimal,
    pub cumulative_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub months: usize,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_change: Decimal,
    pub ending_balance: Decimal,
    pub lowest_balance: Decimal,
    pub lowest_balance_month: Option<YearMonth>,
    pub first_negative_month: Option<YearMonth>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationLine {
    pub name: String,
    pub kind: InstrumentKind,
    pub effective_gross: Decimal,
    pub allocated: Decimal,
    pub is_future_amount: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBreakdown {
    pub month: YearMonth,
    pub month_label: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub lines: Vec<AllocationLine>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn custom_months_accepts_arrays_and_strings() {
        let months: CustomMonths = serde_json::from_str("[1, \"4\", 7]").expect("parse");
        assert_eq!(months, CustomMonths::new([1, 4, 7]));

        let months: CustomMonths = serde_json::from_str("\"3, 9\"").expect("parse");
        assert_eq!(months, CustomMonths::new([3, 9]));

        let months: CustomMonths = serde_json::from_str("\"[2,12]\"").expect("parse");
        assert_eq!(months, CustomMonths::new([2, 12]));
    }

    #[test]
    fn custom_months_fail_closed_on_malformed_input() {
        for raw in ["\"jan,feb\"", "[0, 3]", "[13]", "{\"a\":1}", "\"[oops\"", "[1.5]"] {
            let months: CustomMonths = serde_json::from_str(raw).expect("never errors");
            assert!(months.is_empty(), "expected empty for {raw}");
        }
        assert!(CustomMonths::new([1, 99]).is_empty());
    }

    #[test]
    fn income_parses_camel_case_record_with_defaults() {
        let json = r#"{
          "name": "Salary",
          "amount": "5000",
          "frequency": "monthly",
          "startDate": "2025-01-01",
          "lifecycleCategory": "current-recurring",
          "subjectToContribution": true,
          "netAmount": 4000,
          "futureChange": {
            "changeFlag": true,
            "futureAmount": 6000,
            "futureStartDate": "2025-07-01"
          }
        }"#;
        let income: IncomeInstrument = serde_json::from_str(json).expect("valid income");
        assert_eq!(income.amount, dec!(5000));
        assert!(income.is_active);
        assert!(income.is_projectable());
        assert_eq!(income.net_amount, Some(dec!(4000)));
        let change = income.future_change.expect("future change");
        assert!(change.change_flag);
        assert_eq!(change.future_amount, Some(dec!(6000)));
        assert_eq!(change.future_end_date, None);
    }

    #[test]
    fn unparsable_amount_becomes_zero() {
        let json = r#"{
          "amount": "twelve",
          "frequency": "semiYearly",
          "startDate": "2025-01-01"
        }"#;
        let expense: ExpenseInstrument = serde_json::from_str(json).expect("valid expense");
        assert_eq!(expense.amount, Decimal::ZERO);
        assert_eq!(expense.frequency, Frequency::SemiYearly);
        assert_eq!(expense.lifecycle_category, LifecycleCategory::Other);
        assert!(!expense.is_projectable());
    }

    #[test]
    fn null_flags_fall_back_to_defaults() {
        let json = r#"{
          "name": "Salary",
          "amount": 5000,
          "frequency": "monthly",
          "startDate": "2025-01-01",
          "lifecycleCategory": "current-recurring",
          "isActive": null,
          "subjectToContribution": null,
          "futureChange": {"changeFlag": null, "futureAmount": 6000}
        }"#;
        let income: IncomeInstrument = serde_json::from_str(json).expect("valid income");
        assert!(income.is_active);
        assert!(income.is_projectable());
        assert!(!income.subject_to_contribution);
        assert!(!income.future_change.expect("future change").change_flag);
    }

    #[test]
    fn malformed_flags_and_null_category_do_not_reject_the_record() {
        let json = r#"{
          "amount": 80,
          "frequency": "monthly",
          "startDate": "2025-01-01",
          "lifecycleCategory": null,
          "isActive": "false"
        }"#;
        let expense: ExpenseInstrument = serde_json::from_str(json).expect("valid expense");
        assert_eq!(expense.lifecycle_category, LifecycleCategory::Other);
        assert!(!expense.is_active);

        let json = r#"{
          "amount": 80,
          "frequency": "monthly",
          "startDate": "2025-01-01",
          "lifecycleCategory": 7,
          "isActive": "maybe"
        }"#;
        let expense: ExpenseInstrument = serde_json::from_str(json).expect("valid expense");
        assert_eq!(expense.lifecycle_category, LifecycleCategory::Other);
        assert!(expense.is_active);
    }

    #[test]
    fn unknown_lifecycle_category_is_excluded() {
        let json = r#"{
          "amount": 10,
          "frequency": "one-time",
          "startDate": "2025-01-01",
          "lifecycleCategory": "archived"
        }"#;
        let expense: ExpenseInstrument = serde_json::from_str(json).expect("valid expense");
        assert_eq!(expense.lifecycle_category, LifecycleCategory::Other);
    }
}
