use serde_json::Value;

use crate::error::{Evaluation, SkipReason};

/// Minimum winning price for a closed market to count as resolved (inclusive)
pub const RESOLUTION_THRESHOLD: f64 = 0.90;

/// Decide which outcome a closed market resolved to.
///
/// Both vectors may arrive as JSON-encoded strings (`"[\"0.99\", \"0.01\"]"`)
/// or as already-parsed arrays. The winner is the label at the first index of
/// the highest price, provided that price reaches [`RESOLUTION_THRESHOLD`].
pub fn infer_resolution(
    outcome_prices: Option<&Value>,
    outcomes: Option<&Value>,
) -> Evaluation<String> {
    let prices = decode_list(outcome_prices, "outcome_prices")?
        .iter()
        .map(|p| price_value(p).ok_or_else(|| malformed("outcome_prices", p)))
        .collect::<Evaluation<Vec<f64>>>()?;
    let mut labels = parse_labels(outcomes)?;

    if prices.len() != labels.len() {
        return Err(SkipReason::LengthMismatch {
            prices: prices.len(),
            outcomes: labels.len(),
        });
    }
    if prices.len() < 2 {
        return Err(SkipReason::TooFewOutcomes(prices.len()));
    }

    // Strict comparison keeps the first of equal maxima
    let mut winner = 0;
    for (i, price) in prices.iter().enumerate().skip(1) {
        if *price > prices[winner] {
            winner = i;
        }
    }

    let max_price = prices[winner];
    if max_price < RESOLUTION_THRESHOLD {
        return Err(SkipReason::Indecisive { max_price });
    }

    Ok(labels.swap_remove(winner))
}

/// Parse outcome labels from either encoding
pub fn parse_labels(outcomes: Option<&Value>) -> Evaluation<Vec<String>> {
    decode_list(outcomes, "outcomes")?
        .iter()
        .map(|o| o.as_str().map(str::to_string).ok_or_else(|| malformed("outcomes", o)))
        .collect()
}

/// Unwrap a JSON array that may itself be JSON-encoded inside a string.
pub(crate) fn decode_list(value: Option<&Value>, field: &'static str) -> Evaluation<Vec<Value>> {
    match value {
        None | Some(Value::Null) => Err(SkipReason::Missing(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(SkipReason::Missing(field)),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) if items.is_empty() => Err(SkipReason::Missing(field)),
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(malformed(field, &other)),
            Err(e) => Err(SkipReason::Malformed {
                field,
                detail: e.to_string(),
            }),
        },
        Some(Value::Array(items)) if items.is_empty() => Err(SkipReason::Missing(field)),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(malformed(field, other)),
    }
}

/// Numeric value of a price given as a JSON number or numeric string
pub(crate) fn price_value(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

fn malformed(field: &'static str, value: &Value) -> SkipReason {
    SkipReason::Malformed {
        field,
        detail: format!("unexpected value {}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(prices: Value, outcomes: Value) -> Evaluation<String> {
        infer_resolution(Some(&prices), Some(&outcomes))
    }

    #[test]
    fn test_yes_wins() {
        let result = infer(json!(r#"["0.9999995", "0.0000005"]"#), json!(r#"["Yes", "No"]"#));
        assert_eq!(result, Ok("Yes".to_string()));
    }

    #[test]
    fn test_no_wins_mixed_encodings() {
        let result = infer(json!(r#"["0.0000005", "0.9999995"]"#), json!(["Yes", "No"]));
        assert_eq!(result, Ok("No".to_string()));
    }

    #[test]
    fn test_zeroed_prices_undetermined() {
        let result = infer(json!(["0", "0"]), json!(r#"["Yes", "No"]"#));
        assert_eq!(result, Err(SkipReason::Indecisive { max_price: 0.0 }));

        let result = infer(json!(r#"["0", "0"]"#), json!(r#"["Yes", "No"]"#));
        assert!(matches!(result, Err(SkipReason::Indecisive { .. })));
    }

    #[test]
    fn test_numeric_array_prices() {
        let result = infer(json!([0.999999, 0.000001]), json!(["Yes", "No"]));
        assert_eq!(result, Ok("Yes".to_string()));
    }

    #[test]
    fn test_single_outcome_undetermined() {
        let result = infer(json!(r#"["0.95"]"#), json!(r#"["Yes"]"#));
        assert_eq!(result, Err(SkipReason::TooFewOutcomes(1)));
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(
            infer(json!(r#"["0.91", "0.09"]"#), json!(r#"["Yes", "No"]"#)),
            Ok("Yes".to_string())
        );
        assert_eq!(
            infer(json!(["0.90", "0.10"]), json!(["Yes", "No"])),
            Ok("Yes".to_string())
        );
        assert!(matches!(
            infer(json!(r#"["0.89", "0.11"]"#), json!(r#"["Yes", "No"]"#)),
            Err(SkipReason::Indecisive { .. })
        ));
    }

    #[test]
    fn test_invalid_json_undetermined() {
        let result = infer(json!("not json"), json!(r#"["Yes"]"#));
        assert!(matches!(
            result,
            Err(SkipReason::Malformed {
                field: "outcome_prices",
                ..
            })
        ));
    }

    #[test]
    fn test_non_numeric_price_undetermined() {
        let result = infer(json!(["abc", "0.95"]), json!(["Yes", "No"]));
        assert!(matches!(result, Err(SkipReason::Malformed { .. })));

        let result = infer(json!(["NaN", "0.95"]), json!(["Yes", "No"]));
        assert!(matches!(result, Err(SkipReason::Malformed { .. })));
    }

    #[test]
    fn test_missing_and_mismatched() {
        assert_eq!(
            infer_resolution(None, Some(&json!(["Yes", "No"]))),
            Err(SkipReason::Missing("outcome_prices"))
        );
        assert_eq!(
            infer(json!(""), json!(["Yes", "No"])),
            Err(SkipReason::Missing("outcome_prices"))
        );
        assert_eq!(
            infer(json!(["0.95", "0.05", "0"]), json!(["Yes", "No"])),
            Err(SkipReason::LengthMismatch {
                prices: 3,
                outcomes: 2
            })
        );
    }

    #[test]
    fn test_tie_picks_first_index() {
        let result = infer(json!(["0.95", "0.95", "0.1"]), json!(["A", "B", "C"]));
        assert_eq!(result, Ok("A".to_string()));
    }

    #[test]
    fn test_format_agnostic() {
        let cases = [
            (vec!["0.3", "0.7"], vec!["Up", "Down"]),
            (vec!["0.95", "0.05"], vec!["Trump", "Harris"]),
            (vec!["0.02", "0.01", "0.97"], vec!["A", "B", "C"]),
        ];

        for (prices, outcomes) in cases {
            let parsed = infer(json!(prices), json!(outcomes));
            let encoded = infer(
                Value::String(serde_json::to_string(&prices).unwrap()),
                Value::String(serde_json::to_string(&outcomes).unwrap()),
            );
            assert_eq!(parsed, encoded);
        }
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            parse_labels(Some(&json!(r#"["Yes", "No"]"#))),
            Ok(vec!["Yes".to_string(), "No".to_string()])
        );
        assert!(parse_labels(Some(&json!([1, 2]))).is_err());
    }
}
