use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::money::round2;

/// Age assumed when the contributor's age is unknown (a mid-career employee).
pub const DEFAULT_CONTRIBUTOR_AGE: u32 = 30;

/// Monthly wage ceiling above which gross pay attracts no contribution.
pub const DEFAULT_WAGE_CEILING: Decimal = dec!(8000);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRates {
    pub employer_rate: Decimal,
    pub employee_rate: Decimal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubAccount {
    Ordinary,
    Special,
    Retirement,
    Medisave,
}

/// One row of an age-tiered table. `max_age` is inclusive; `None` marks the
/// catch-all band that must close every table.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeBand<T> {
    pub max_age: Option<u32>,
    pub value: T,
}

impl<T> AgeBand<T> {
    fn covers(&self, age: u32) -> bool {
        self.max_age.is_none_or(|max| age <= max)
    }
}

fn band_for<T>(bands: &[AgeBand<T>], age: u32) -> Option<&T> {
    bands
        .iter()
        .find(|band| band.covers(age))
        .or_else(|| bands.last())
        .map(|band| &band.value)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionBreakdown {
    pub gross_amount: Decimal,
    pub applicable_amount: Decimal,
    pub employee_amount: Decimal,
    pub employer_amount: Decimal,
    pub total_amount: Decimal,
    pub net_take_home: Decimal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemeError {
    #[error("{table} table is empty")]
    EmptyTable { table: &'static str },
    #[error("{table} table is not ordered by ascending max age at row {row}")]
    Unordered { table: &'static str, row: usize },
    #[error("{table} table must end with a catch-all band")]
    MissingCatchAll { table: &'static str },
    #[error("wage ceiling must be >= 0, got {0}")]
    NegativeCeiling(Decimal),
    #[error("contribution rates must be within 0..=1 at row {row}")]
    InvalidRate { row: usize },
    #[error("sub-account shares at row {row} sum to {sum}, expected 1")]
    SharesDoNotSumToOne { row: usize, sum: Decimal },
}

/// Age-tiered, ceiling-capped payroll contribution scheme.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionScheme {
    pub wage_ceiling: Decimal,
    pub age_bands: Vec<AgeBand<ContributionRates>>,
    pub allocation_bands: Vec<AgeBand<BTreeMap<SubAccount, Decimal>>>,
}

fn rates_band(max_age: Option<u32>, employer: Decimal, employee: Decimal) -> AgeBand<ContributionRates> {
    AgeBand {
        max_age,
        value: ContributionRates {
            employer_rate: employer,
            employee_rate: employee,
        },
    }
}

fn shares_band(
    max_age: Option<u32>,
    shares: [(SubAccount, Decimal); 3],
) -> AgeBand<BTreeMap<SubAccount, Decimal>> {
    AgeBand {
        max_age,
        value: shares.into_iter().collect(),
    }
}

impl Default for ContributionScheme {
    fn default() -> Self {
        use SubAccount::{Medisave, Ordinary, Retirement, Special};

        Self {
            wage_ceiling: DEFAULT_WAGE_CEILING,
            age_bands: vec![
                rates_band(Some(55), dec!(0.17), dec!(0.20)),
                rates_band(Some(60), dec!(0.155), dec!(0.17)),
                rates_band(Some(65), dec!(0.12), dec!(0.115)),
                rates_band(Some(70), dec!(0.09), dec!(0.075)),
                rates_band(None, dec!(0.075), dec!(0.05)),
            ],
            allocation_bands: vec![
                shares_band(
                    Some(35),
                    [(Ordinary, dec!(0.6217)), (Special, dec!(0.1621)), (Medisave, dec!(0.2162))],
                ),
                shares_band(
                    Some(45),
                    [(Ordinary, dec!(0.5677)), (Special, dec!(0.1891)), (Medisave, dec!(0.2432))],
                ),
                shares_band(
                    Some(50),
                    [(Ordinary, dec!(0.5136)), (Special, dec!(0.2162)), (Medisave, dec!(0.2702))],
                ),
                shares_band(
                    Some(55),
                    [(Ordinary, dec!(0.4055)), (Special, dec!(0.3108)), (Medisave, dec!(0.2837))],
                ),
                shares_band(
                    Some(60),
                    [(Ordinary, dec!(0.3694)), (Retirement, dec!(0.3076)), (Medisave, dec!(0.3230))],
                ),
                shares_band(
                    Some(65),
                    [(Ordinary, dec!(0.1496)), (Retirement, dec!(0.4042)), (Medisave, dec!(0.4462))],
                ),
                shares_band(
                    Some(70),
                    [(Ordinary, dec!(0.0607)), (Retirement, dec!(0.3030)), (Medisave, dec!(0.6363))],
                ),
                shares_band(
                    None,
                    [(Ordinary, dec!(0.08)), (Retirement, dec!(0.08)), (Medisave, dec!(0.84))],
                ),
            ],
        }
    }
}

fn validate_bands<T>(table: &'static str, bands: &[AgeBand<T>]) -> Result<(), SchemeError> {
    let Some(last) = bands.last() else {
        return Err(SchemeError::EmptyTable { table });
    };
    if last.max_age.is_some() {
        return Err(SchemeError::MissingCatchAll { table });
    }
    let mut previous: Option<u32> = None;
    for (row, band) in bands.iter().enumerate() {
        match (previous, band.max_age) {
            (_, None) if row + 1 != bands.len() => {
                return Err(SchemeError::Unordered { table, row });
            }
            (Some(prev), Some(max)) if max <= prev => {
                return Err(SchemeError::Unordered { table, row });
            }
            _ => {}
        }
        previous = band.max_age;
    }
    Ok(())
}

impl ContributionScheme {
    pub fn with_wage_ceiling(mut self, wage_ceiling: Decimal) -> Self {
        self.wage_ceiling = wage_ceiling;
        self
    }

    pub fn validate(&self) -> Result<(), SchemeError> {
        if self.wage_ceiling < Decimal::ZERO {
            return Err(SchemeError::NegativeCeiling(self.wage_ceiling));
        }
        validate_bands("age band", &self.age_bands)?;
        validate_bands("allocation", &self.allocation_bands)?;

        let unit = Decimal::ZERO..=Decimal::ONE;
        for (row, band) in self.age_bands.iter().enumerate() {
            if !unit.contains(&band.value.employer_rate) || !unit.contains(&band.value.employee_rate)
            {
                return Err(SchemeError::InvalidRate { row });
            }
        }
        for (row, band) in self.allocation_bands.iter().enumerate() {
            let sum = band.value.values().copied().sum::<Decimal>();
            if sum != Decimal::ONE {
                return Err(SchemeError::SharesDoNotSumToOne { row, sum });
            }
        }
        Ok(())
    }

    pub fn rates_for(&self, age: u32) -> ContributionRates {
        band_for(&self.age_bands, age).copied().unwrap_or(ContributionRates {
            employer_rate: Decimal::ZERO,
            employee_rate: Decimal::ZERO,
        })
    }

    /// Splits contributions on `gross_amount`. Only the contribution base is
    /// capped at the wage ceiling; take-home is reduced from the full gross.
    pub fn compute_contribution(&self, gross_amount: Decimal, age: Option<u32>) -> ContributionBreakdown {
        let gross = gross_amount.max(Decimal::ZERO);
        let rates = self.rates_for(age.unwrap_or(DEFAULT_CONTRIBUTOR_AGE));

        let applicable_amount = gross.min(self.wage_ceiling.max(Decimal::ZERO));
        let employee_amount = round2(applicable_amount * rates.employee_rate);
        let employer_amount = round2(applicable_amount * rates.employer_rate);

        ContributionBreakdown {
            gross_amount: round2(gross),
            applicable_amount: round2(applicable_amount),
            employee_amount,
            employer_amount,
            total_amount: employee_amount + employer_amount,
            net_take_home: round2(gross - employee_amount),
        }
    }

    /// Distributes `total_amount` across sub-accounts by the age band's shares.
    ///
    /// Each share is rounded on its own and the parts are not reconciled
    /// against the total, so they may drift from it by a cent. Downstream
    /// figures already rely on these exact values.
    pub fn compute_sub_account_allocation(
        &self,
        total_amount: Decimal,
        age: Option<u32>,
    ) -> BTreeMap<SubAccount, Decimal> {
        let age = age.unwrap_or(DEFAULT_CONTRIBUTOR_AGE);
        band_for(&self.allocation_bands, age)
            .map(|shares| {
                shares
                    .iter()
                    .map(|(account, share)| (*account, round2(total_amount * *share)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn compute_contribution(gross_amount: Decimal, age: Option<u32>) -> ContributionBreakdown {
    ContributionScheme::default().compute_contribution(gross_amount, age)
}

pub fn compute_sub_account_allocation(
    total_amount: Decimal,
    age: Option<u32>,
) -> BTreeMap<SubAccount, Decimal> {
    ContributionScheme::default().compute_sub_account_allocation(total_amount, age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    #[test]
    fn default_scheme_is_valid() {
        assert_eq!(ContributionScheme::default().validate(), Ok(()));
    }

    #[test]
    fn ceiling_caps_contribution_base_but_not_take_home() {
        let result = compute_contribution(dec!(10000), Some(30));
        assert_eq!(result.applicable_amount, dec!(8000.00));
        assert_eq!(result.employee_amount, dec!(1600.00));
        assert_eq!(result.employer_amount, dec!(1360.00));
        assert_eq!(result.total_amount, dec!(2960.00));
        assert_eq!(result.net_take_home, dec!(8400.00));
    }

    #[test]
    fn below_ceiling_uses_full_gross() {
        let result = compute_contribution(dec!(5000), Some(30));
        assert_eq!(result.applicable_amount, dec!(5000));
        assert_eq!(result.employee_amount, dec!(1000.00));
        assert_eq!(result.employer_amount, dec!(850.00));
        assert_eq!(result.net_take_home, dec!(4000.00));
    }

    #[test]
    fn missing_age_uses_default_contributor_age() {
        let explicit = compute_contribution(dec!(4321.09), Some(DEFAULT_CONTRIBUTOR_AGE));
        let implicit = compute_contribution(dec!(4321.09), None);
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn age_band_boundaries_are_inclusive() {
        let scheme = ContributionScheme::default();
        assert_eq!(scheme.rates_for(55).employee_rate, dec!(0.20));
        assert_eq!(scheme.rates_for(56).employee_rate, dec!(0.17));
        assert_eq!(scheme.rates_for(70).employer_rate, dec!(0.09));
        assert_eq!(scheme.rates_for(71).employer_rate, dec!(0.075));
        assert_eq!(scheme.rates_for(120).employee_rate, dec!(0.05));
    }

    #[test]
    fn age_past_last_bounded_band_falls_back_to_final_band() {
        let scheme = ContributionScheme {
            wage_ceiling: dec!(8000),
            age_bands: vec![
                rates_band(Some(40), dec!(0.1), dec!(0.1)),
                rates_band(Some(60), dec!(0.05), dec!(0.05)),
            ],
            allocation_bands: Vec::new(),
        };
        assert_eq!(scheme.rates_for(99).employer_rate, dec!(0.05));
    }

    #[test]
    fn employee_share_rounds_to_cents() {
        let result = compute_contribution(dec!(1234.567), Some(60));
        assert_eq!(result.employee_amount, dec!(209.88));
        assert_eq!(result.employer_amount, dec!(191.36));
        assert_eq!(result.net_take_home, dec!(1024.69));
    }

    #[test]
    fn negative_gross_is_treated_as_zero() {
        let result = compute_contribution(dec!(-50), None);
        assert_eq!(result.total_amount, Decimal::ZERO);
        assert_eq!(result.net_take_home, Decimal::ZERO);
    }

    #[test]
    fn sub_account_allocation_uses_age_band_shares() {
        let parts = compute_sub_account_allocation(dec!(2960), Some(30));
        assert_eq!(parts.get(&SubAccount::Ordinary), Some(&dec!(1840.23)));
        assert_eq!(parts.get(&SubAccount::Special), Some(&dec!(479.82)));
        assert_eq!(parts.get(&SubAccount::Medisave), Some(&dec!(639.95)));
        assert!(!parts.contains_key(&SubAccount::Retirement));

        let parts = compute_sub_account_allocation(dec!(1000), Some(58));
        assert!(parts.contains_key(&SubAccount::Retirement));
        assert!(!parts.contains_key(&SubAccount::Special));
    }

    #[test]
    fn sub_account_rounding_residual_is_not_reconciled() {
        // 1.497496 -> 1.50, 4.046042 -> 4.05, 4.466462 -> 4.47
        let parts = compute_sub_account_allocation(dec!(10.01), Some(61));
        let sum = parts.values().copied().sum::<Decimal>();
        assert_eq!(sum, dec!(10.02));

        // 0.01496 -> 0.01, 0.04042 -> 0.04, 0.04462 -> 0.04
        let parts = compute_sub_account_allocation(dec!(0.10), Some(61));
        let sum = parts.values().copied().sum::<Decimal>();
        assert_eq!(sum, dec!(0.09));
    }

    #[test]
    fn validate_rejects_malformed_tables() {
        let mut scheme = ContributionScheme::default();
        scheme.age_bands.clear();
        assert_eq!(
            scheme.validate(),
            Err(SchemeError::EmptyTable { table: "age band" })
        );

        let mut scheme = ContributionScheme::default();
        scheme.age_bands.swap(0, 1);
        assert_eq!(
            scheme.validate(),
            Err(SchemeError::Unordered {
                table: "age band",
                row: 1
            })
        );

        let mut scheme = ContributionScheme::default();
        scheme.allocation_bands.pop();
        assert_eq!(
            scheme.validate(),
            Err(SchemeError::MissingCatchAll {
                table: "allocation"
            })
        );

        let mut scheme = ContributionScheme::default();
        scheme.allocation_bands[0]
            .value
            .insert(SubAccount::Ordinary, dec!(0.7));
        assert!(matches!(
            scheme.validate(),
            Err(SchemeError::SharesDoNotSumToOne { row: 0, .. })
        ));

        let scheme = ContributionScheme::default().with_wage_ceiling(dec!(-1));
        assert_eq!(scheme.validate(), Err(SchemeError::NegativeCeiling(dec!(-1))));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_contribution_components_are_consistent(
            gross_cents in 0u64..5_000_000,
            age in 16u32..100
        ) {
            let gross = Decimal::new(gross_cents as i64, 2);
            let result = compute_contribution(gross, Some(age));

            prop_assert!(result.applicable_amount <= DEFAULT_WAGE_CEILING);
            prop_assert!(result.applicable_amount <= gross);
            prop_assert_eq!(result.total_amount, result.employee_amount + result.employer_amount);
            prop_assert_eq!(result.net_take_home, gross - result.employee_amount);
            prop_assert!(result.net_take_home >= Decimal::ZERO);
            prop_assert!(result.employee_amount <= result.applicable_amount);
        }

        #[test]
        fn prop_sub_account_drift_is_bounded(
            total_cents in 0u64..1_000_000,
            age in 16u32..100
        ) {
            let total = Decimal::new(total_cents as i64, 2);
            let parts = compute_sub_account_allocation(total, Some(age));
            let sum = parts.values().copied().sum::<Decimal>();
            prop_assert_eq!(parts.len(), 3);
            prop_assert!((sum - total).abs() <= dec!(0.02));
        }
    }
}
