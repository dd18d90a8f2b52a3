use serde_json::Value;
use std::collections::BTreeMap;
use storeai_contracts::{ResponseBody, ResponseEnvelope, RETURN_CODE_OK};

const ALLOW_HEADERS: &str =
    "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token,apikey";

/// Fixed headers carried by every handler response.
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            "POST,OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            ALLOW_HEADERS.to_string(),
        ),
    ])
}

/// Build a response envelope. `returnCode` is `"0000"` exactly when the status
/// is 200; a missing or contradictory code falls back to the status itself.
pub fn build_response(status_code: u16, return_code: Option<&str>, data: Value) -> ResponseEnvelope {
    let return_code = match (status_code, return_code) {
        (200, _) => RETURN_CODE_OK.to_string(),
        (_, Some(code)) if !code.is_empty() && code != RETURN_CODE_OK => code.to_string(),
        _ => status_code.to_string(),
    };
    ResponseEnvelope {
        status_code,
        headers: default_headers(),
        body: ResponseBody { return_code, data },
    }
}

pub fn success(data: impl Into<Value>) -> ResponseEnvelope {
    build_response(200, Some(RETURN_CODE_OK), data.into())
}

pub fn failure(status_code: u16, return_code: &str, message: impl Into<String>) -> ResponseEnvelope {
    build_response(status_code, Some(return_code), Value::String(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_uses_zero_code_and_cors_headers() {
        let env = success("Hi ");
        assert_eq!(env.status_code, 200);
        assert_eq!(env.body.return_code, "0000");
        assert_eq!(env.body.data, json!("Hi "));
        assert_eq!(env.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(env.headers["Content-Type"], "application/json");
    }

    #[test]
    fn return_code_follows_status_invariant() {
        assert_eq!(build_response(200, Some("9999"), Value::Null).body.return_code, "0000");
        assert_eq!(build_response(400, None, Value::Null).body.return_code, "400");
        assert_eq!(build_response(500, Some("0000"), Value::Null).body.return_code, "500");
        assert_eq!(
            failure(429, "rate_limit_exceeded", "slow down").body.return_code,
            "rate_limit_exceeded"
        );
    }

    #[test]
    fn serializes_with_wire_names() {
        let value = serde_json::to_value(failure(403, "403", "Invalid API key")).unwrap();
        assert_eq!(value["statusCode"], 403);
        assert_eq!(value["body"]["returnCode"], "403");
        assert_eq!(value["body"]["data"], "Invalid API key");
    }
}
