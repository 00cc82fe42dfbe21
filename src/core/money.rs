use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Rounds to cents, half away from zero, always carrying two fractional digits.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub(crate) fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            Decimal::from_str(trimmed).ok()
        }
        _ => None,
    }
}

/// Accepts a JSON number or numeric string. Anything else becomes zero so the
/// owning instrument drops out of the projection instead of failing the request.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_amount(&value).unwrap_or_else(|| {
        tracing::warn!(raw = %value, "unparsable amount, treating as zero");
        Decimal::ZERO
    }))
}

pub(crate) fn lenient_optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let parsed = parse_amount(&value);
    if parsed.is_none() {
        tracing::warn!(raw = %value, "unparsable optional amount, ignoring");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round2(dec!(2.004)), dec!(2.00));
    }

    #[test]
    fn round2_always_renders_two_decimals() {
        assert_eq!(round2(dec!(100)).to_string(), "100.00");
        assert_eq!(round2(dec!(0.5)).to_string(), "0.50");
    }

    #[test]
    fn parse_amount_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_amount(&serde_json::json!(33.33)), Some(dec!(33.33)));
        assert_eq!(parse_amount(&serde_json::json!(5000)), Some(dec!(5000)));
        assert_eq!(parse_amount(&serde_json::json!(" 12.50 ")), Some(dec!(12.50)));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(&serde_json::json!("abc")), None);
        assert_eq!(parse_amount(&serde_json::json!("")), None);
        assert_eq!(parse_amount(&serde_json::json!(true)), None);
        assert_eq!(parse_amount(&serde_json::json!(null)), None);
    }
}
