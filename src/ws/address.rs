//! Builds the address a transport connects to.

use serde_json::Value;
use url::Url;

use super::config::Config;
use super::error::WsError;

/// Resolve the connection address for `url` under `config`.
///
/// With `transform_protocol` set, `http` and `https` become `ws` and `wss`. Query entries are
/// appended after any parameters already present on the URL.
pub(crate) fn build(url: &str, config: &Config) -> Result<Url, WsError> {
    let url = if config.transform_protocol {
        transform_protocol(url)
    } else {
        url.to_owned()
    };
    let mut address = Url::parse(&url).map_err(|e| WsError::InvalidAddress(e.to_string()))?;

    let pairs = query_pairs(&config.query);
    if !pairs.is_empty() {
        address.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(address)
}

fn transform_protocol(url: &str) -> String {
    match url.strip_prefix("http") {
        Some(rest) => format!("ws{rest}"),
        None => url.to_owned(),
    }
}

/// Flatten a JSON object into query pairs.
///
/// Null and empty-string values are skipped. One level of nesting is expanded into
/// `key[sub]=value`; anything deeper is written as JSON text.
fn query_pairs(query: &Value) -> Vec<(String, String)> {
    let Value::Object(entries) = query else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    for (key, value) in entries {
        match value {
            Value::Object(nested) => {
                for (sub, value) in nested {
                    if let Some(value) = query_value(value) {
                        pairs.push((format!("{key}[{sub}]"), value));
                    }
                }
            }
            Value::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    if let Some(value) = query_value(value) {
                        pairs.push((format!("{key}[{index}]"), value));
                    }
                }
            }
            value => {
                if let Some(value) = query_value(value) {
                    pairs.push((key.clone(), value));
                }
            }
        }
    }
    pairs
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}
