//! The single Payme JSON-RPC endpoint.
//!
//! Payme always speaks HTTP 200; success and failure both live in the
//! JSON-RPC envelope. The body is parsed by hand so a malformed payload
//! can still be answered with `-32700` instead of a transport error.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use tezshop_payments::services::payme::{
    CancelParams, CheckParams, CheckPerformParams, CreateParams, PerformParams, StatementParams,
};
use tezshop_payments::PaymeError;

use crate::state::AppState;

pub async fn payme_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return error_response(Value::Null, &PaymeError::ParseError),
    };
    let request_id = envelope.get("id").cloned().unwrap_or(Value::Null);

    if !authorized(&headers, &state.settings.payme_key) {
        return error_response(request_id, &PaymeError::Unauthorized);
    }

    let method = envelope.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = envelope.get("params").cloned().unwrap_or_else(|| json!({}));

    match dispatch(&state, method, params).await {
        Ok(result) => Json(json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "result": result,
        })),
        Err(err) => {
            if let PaymeError::Database(ref db_err) = err {
                tracing::error!(method, %db_err, "payme method failed on database error");
            }
            error_response(request_id, &err)
        }
    }
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> Result<Value, PaymeError> {
    match method {
        "CheckPerformTransaction" => {
            let params: CheckPerformParams = parse(params)?;
            to_value(state.payme.check_perform_transaction(params).await?)
        }
        "CreateTransaction" => {
            let params: CreateParams = parse(params)?;
            to_value(state.payme.create_transaction(params).await?)
        }
        "PerformTransaction" => {
            let params: PerformParams = parse(params)?;
            to_value(state.payme.perform_transaction(params).await?)
        }
        "CancelTransaction" => {
            let params: CancelParams = parse(params)?;
            to_value(state.payme.cancel_transaction(params).await?)
        }
        "CheckTransaction" => {
            let params: CheckParams = parse(params)?;
            to_value(state.payme.check_transaction(params).await?)
        }
        "GetStatement" => {
            let params: StatementParams = parse(params)?;
            to_value(state.payme.get_statement(params).await?)
        }
        // Acknowledged so the cabinet can rotate the key; the new value is
        // applied through configuration.
        "ChangePassword" => Ok(json!({ "success": true })),
        other => Err(PaymeError::MethodNotFound(other.to_string())),
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, PaymeError> {
    serde_json::from_value(params).map_err(|_| PaymeError::ParseError)
}

fn to_value<T: serde::Serialize>(result: T) -> Result<Value, PaymeError> {
    Ok(serde_json::to_value(result)?)
}

/// `Authorization: Basic base64("<login>:<PAYME_KEY>")`; only the password
/// matters.
fn authorized(headers: &HeaderMap, payme_key: &str) -> bool {
    let Some(header) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mut parts = header.splitn(2, ' ');
    if !parts.next().unwrap_or_default().eq_ignore_ascii_case("basic") {
        return false;
    }
    let Some(encoded) = parts.next() else { return false };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else { return false };
    let Ok(credentials) = String::from_utf8(decoded) else { return false };
    match credentials.split_once(':') {
        Some((_login, password)) => password == payme_key,
        None => false,
    }
}

fn error_response(request_id: Value, err: &PaymeError) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "error": {
            "code": err.code(),
            "message": { "ru": err.message_ru() },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(login: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{login}:{password}"));
        headers.insert(AUTHORIZATION, format!("Basic {token}").parse().unwrap());
        headers
    }

    #[test]
    fn accepts_matching_password() {
        assert!(authorized(&basic("PaymeBusiness", "secret"), "secret"));
    }

    #[test]
    fn password_may_contain_colons() {
        assert!(authorized(&basic("PaymeBusiness", "se:cr:et"), "se:cr:et"));
    }

    #[test]
    fn rejects_wrong_password_and_scheme() {
        assert!(!authorized(&basic("PaymeBusiness", "wrong"), "secret"));
        assert!(!authorized(&HeaderMap::new(), "secret"));

        let mut bearer = HeaderMap::new();
        bearer.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert!(!authorized(&bearer, "secret"));
    }
}
