use common::{MirrorError, MirrorResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parses a point-lookup body `{"value": V}`.
///
/// A missing or `null` value reads as absent. An array where a single value
/// is expected means the caller asked the wrong endpoint or the mirror serves
/// a list type, and is rejected.
pub fn parse_value<V: DeserializeOwned>(body: &[u8]) -> MirrorResult<Option<V>> {
    match extract_value(body)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(_)) => Err(MirrorError::protocol(
            "Expected single value, but got an array",
        )),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MirrorError::protocol(format!("cannot decode mirror value: {e}"))),
    }
}

/// Parses a list body `{"value": [V, ...]}`.
pub fn parse_list<V: DeserializeOwned>(body: &[u8]) -> MirrorResult<Vec<V>> {
    match extract_value(body)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .map_err(|e| MirrorError::protocol(format!("cannot decode mirror value: {e}")))
            })
            .collect(),
        Some(_) => Err(MirrorError::protocol(
            "Expected a list of values, but got a single value",
        )),
    }
}

fn extract_value(body: &[u8]) -> MirrorResult<Option<Value>> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| MirrorError::protocol(format!("mirror body is not JSON: {e}")))?;
    match document {
        Value::Object(mut fields) => Ok(fields.remove("value")),
        _ => Err(MirrorError::protocol("mirror body is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Purchase {
        id: String,
        amount: i64,
    }

    #[test]
    fn parses_single_value() {
        let body = br#"{"value": {"id": "p1", "amount": 3}}"#;
        let purchase: Option<Purchase> = parse_value(body).unwrap();
        assert_eq!(
            purchase,
            Some(Purchase {
                id: "p1".into(),
                amount: 3
            })
        );
    }

    #[test]
    fn null_value_is_absent() {
        assert_eq!(parse_value::<i64>(br#"{"value": null}"#).unwrap(), None);
        assert_eq!(parse_value::<i64>(br#"{}"#).unwrap(), None);
    }

    #[test]
    fn array_for_single_value_is_rejected() {
        let err = parse_value::<i64>(br#"{"value": [1, 2]}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mirror protocol error: Expected single value, but got an array"
        );
    }

    #[test]
    fn parses_list() {
        let values: Vec<i64> = parse_list(br#"{"value": [1, 2, 3]}"#).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(parse_list::<i64>(br#"{"value": []}"#).unwrap().is_empty());
    }

    #[test]
    fn single_value_for_list_is_rejected() {
        assert!(matches!(
            parse_list::<i64>(br#"{"value": 1}"#),
            Err(MirrorError::Protocol { .. })
        ));
    }

    #[test]
    fn malformed_bodies() {
        assert!(parse_value::<i64>(b"not json").is_err());
        assert!(parse_value::<i64>(b"[1]").is_err());
        assert!(parse_list::<String>(br#"{"value": [1]}"#).is_err());
    }
}
