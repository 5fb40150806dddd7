//! Form-encoded requests and delimiter-split key=value replies

use crate::error::{GatewayError, GatewayResult};
use crate::payments::codec::{Payload, Value};
use crate::payments::types::Bank;

/// `application/x-www-form-urlencoded` body from a flat payload. Null values
/// are left out; nested maps cannot be expressed in a form.
pub fn encode_form(payload: &Payload) -> GatewayResult<Vec<u8>> {
    let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(payload.len());
    for (key, value) in payload {
        match value {
            Value::Null => {}
            Value::Text(text) => pairs.push((key.as_str(), text.as_str())),
            Value::Map(_) | Value::List(_) => {
                return Err(GatewayError::encoding(format!(
                    "Form field '{}' must be a scalar",
                    key
                )))
            }
        }
    }
    Ok(serde_urlencoded::to_string(pairs)?.into_bytes())
}

/// Split a `key=value;;key=value` reply into a flat payload. Only the first
/// `=` of a record separates key from value.
///
/// The bank mixes `;;;` and `;;` between records in the same reply, so both
/// are accepted.
pub fn decode_delimited(bank: Bank, body: &str) -> GatewayResult<Payload> {
    let mut payload = Payload::new();
    let body = body.trim().replace(";;;", ";;");
    for record in body.split(";;") {
        if record.is_empty() {
            continue;
        }
        let (key, value) = record.split_once('=').ok_or_else(|| {
            GatewayError::malformed(bank, format!("record without '=': {}", record))
        })?;
        payload.insert(key.trim(), value);
    }
    if payload.is_empty() {
        return Err(GatewayError::malformed(bank, "empty reply"));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_skips_null_and_escapes() {
        let payload = Payload::new()
            .with("ShopCode", "3123")
            .with("OkUrl", "https://shop.test/ok?a=1&b=2")
            .with("InstallmentCount", Value::Null);
        let body = String::from_utf8(encode_form(&payload).unwrap()).unwrap();

        assert_eq!(
            body,
            "ShopCode=3123&OkUrl=https%3A%2F%2Fshop.test%2Fok%3Fa%3D1%26b%3D2"
        );
    }

    #[test]
    fn test_encode_rejects_nested_values() {
        let payload = Payload::new().with("Extra", Payload::new().with("a", "1"));
        assert!(matches!(
            encode_form(&payload),
            Err(GatewayError::Encoding { .. })
        ));
    }

    #[test]
    fn test_double_and_mixed_separators_decode_identically() {
        let uniform = "OrderId=ORD-1;;ProcReturnCode=00;;AuthCode=S123;;TxnResult=Success";
        let mixed = "OrderId=ORD-1;;;ProcReturnCode=00;;AuthCode=S123;;;TxnResult=Success";

        let a = decode_delimited(Bank::Inter, uniform).unwrap();
        let b = decode_delimited(Bank::Inter, mixed).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.text("AuthCode"), Some("S123"));
    }

    #[test]
    fn test_value_keeps_embedded_equals() {
        let payload = decode_delimited(Bank::Inter, "ErrorMessage=a=b;;ProcReturnCode=99").unwrap();
        assert_eq!(payload.text("ErrorMessage"), Some("a=b"));
    }

    #[test]
    fn test_record_without_equals_is_malformed() {
        let err = decode_delimited(Bank::Inter, "OrderId=1;;garbage").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }
}
