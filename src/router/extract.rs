use crate::account::AccountId;
use crate::event::Side;
use serde_json::Value;

const ACCOUNT_KEYS: [&str; 9] = [
    "user", "wallet", "address", "account", "from", "to", "owner", "trader", "userAddress",
];

const USD_VALUE_KEYS: [&str; 8] = [
    "usd_value",
    "usdValue",
    "value_usd",
    "valueUSD",
    "total_value",
    "totalValue",
    "amount_usd",
    "amountUSD",
];

const PRICE_KEYS: [&str; 3] = ["price", "limitPx", "limit_px"];
const SIZE_KEYS: [&str; 5] = ["size", "sz", "quantity", "amount", "volume"];
const COIN_KEYS: [&str; 2] = ["coin", "symbol"];

const SENTINELS: [&str; 4] = ["unknown", "multiple_wallets", "0x0", "null"];

fn is_valid_account(candidate: &str) -> bool {
    !candidate.is_empty() && !SENTINELS.contains(&candidate.to_ascii_lowercase().as_str())
}

fn find_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}

/// Extract the watched-account identifier (spec.md §4.2.3): inspect the
/// frame envelope, then the `data` body, for the first recognised key
/// holding a non-empty, non-sentinel string.
pub fn extract_account(frame: &Value) -> Option<AccountId> {
    for key in ACCOUNT_KEYS {
        if let Some(candidate) = frame.get(key).and_then(Value::as_str) {
            if is_valid_account(candidate) {
                return Some(AccountId::from(candidate));
            }
        }
    }

    let body = frame.get("data")?;
    for key in ACCOUNT_KEYS {
        if let Some(candidate) = body.get(key).and_then(Value::as_str) {
            if is_valid_account(candidate) {
                return Some(AccountId::from(candidate));
            }
        }
    }

    None
}

/// The individual records to normalise out of a frame's `data` body
/// (spec.md §4.2.5): one per element if it is a list, one if a record,
/// falling back to the frame itself when there is no `data` body.
pub fn payload_records(frame: &Value) -> Vec<&Value> {
    match frame.get("data") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(record @ Value::Object(_)) => vec![record],
        Some(_) | None => vec![frame],
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn find_f64(record: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| record.get(key).and_then(as_f64))
}

pub fn extract_coin(record: &Value) -> Option<String> {
    find_str(record, &COIN_KEYS)
}

pub fn extract_side(record: &Value) -> Option<Side> {
    let raw = record.get("side").and_then(Value::as_str)?;
    Some(match raw.to_ascii_lowercase().as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        "long" => Side::Long,
        "short" => Side::Short,
        _ => Side::Unknown,
    })
}

pub fn extract_price(record: &Value) -> Option<f64> {
    find_f64(record, &PRICE_KEYS)
}

pub fn extract_size(record: &Value) -> Option<f64> {
    find_f64(record, &SIZE_KEYS)
}

/// Compute `usd_value` per spec.md §4.2.6: prefer an explicit field,
/// else derive `price * size`, else leave absent.
pub fn extract_usd_value(record: &Value) -> Option<f64> {
    find_f64(record, &USD_VALUE_KEYS).or_else(|| match (extract_price(record), extract_size(record)) {
        (Some(price), Some(size)) => Some(price * size),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_account_prefers_envelope_user() {
        let frame = json!({"user": "0xabc", "data": {"wallet": "0xdef"}});
        assert_eq!(extract_account(&frame), Some(AccountId::from("0xabc")));
    }

    #[test]
    fn test_extract_account_falls_back_to_body() {
        let frame = json!({"data": {"owner": "0xdef"}});
        assert_eq!(extract_account(&frame), Some(AccountId::from("0xdef")));
    }

    #[test]
    fn test_extract_account_rejects_sentinels() {
        struct TestCase {
            value: &'static str,
        }

        let cases = vec![
            TestCase { value: "unknown" },
            TestCase { value: "multiple_wallets" },
            TestCase { value: "0x0" },
            TestCase { value: "null" },
            TestCase { value: "" },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let frame = json!({"user": test.value});
            assert_eq!(extract_account(&frame), None, "TC{index} failed");
        }
    }

    #[test]
    fn test_extract_usd_value_prefers_explicit_field() {
        let record = json!({"usd_value": 500.0, "price": 10.0, "size": 1.0});
        assert_eq!(extract_usd_value(&record), Some(500.0));
    }

    #[test]
    fn test_extract_usd_value_derives_from_price_and_size() {
        let record = json!({"price": 50_000.0, "size": 25.0});
        assert_eq!(extract_usd_value(&record), Some(1_250_000.0));
    }

    #[test]
    fn test_extract_usd_value_absent_when_no_data() {
        let record = json!({"coin": "BTC"});
        assert_eq!(extract_usd_value(&record), None);
    }

    #[test]
    fn test_payload_records_handles_list_and_record() {
        let list_frame = json!({"data": [{"coin": "BTC"}, {"coin": "ETH"}]});
        assert_eq!(payload_records(&list_frame).len(), 2);

        let record_frame = json!({"data": {"coin": "BTC"}});
        assert_eq!(payload_records(&record_frame).len(), 1);
    }
}
