//! Reply decoders. Each one is a pure function from a single store reply to an [`Outcome`].
use redis::Value;
use serde_json::{json, Map};
use tracing::warn;

/// `{"flag":"OK","msg":"success"}`
pub const STROK: &str = r#"{"flag":"OK","msg":"success"}"#;
/// `{"flag":"FAIL","msg":"failed"}`
pub const STRFAIL: &str = r#"{"flag":"FAIL","msg":"failed"}"#;
/// `{"flag":"NOFOUND","msg":"File not found"}`
pub const STRNOFOUND: &str = r#"{"flag":"NOFOUND","msg":"File not found"}"#;

/// The result of decoding a store reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// the command did what was asked, carries the JSON response payload
    Success(String),
    /// a lookup found nothing
    NotFound,
    /// the reply had an unexpected shape or value
    Failure,
}

impl Outcome {
    /// the body to send back to the client for this outcome
    pub fn into_body(self) -> String {
        match self {
            Outcome::Success(payload) => payload,
            Outcome::NotFound => STRNOFOUND.to_string(),
            Outcome::Failure => STRFAIL.to_string(),
        }
    }
}

/// Decodes replies to write commands (`HSET`, `HMSET`).
/// Succeeds when the reply is the integer `1` or the status `OK`
pub fn status(reply: Value) -> Outcome {
    match reply {
        Value::Int(1) | Value::Okay => Outcome::Success(STROK.to_string()),
        Value::SimpleString(ref s) if s == "OK" => Outcome::Success(STROK.to_string()),
        other => {
            warn!(reply = ?other, "write command was not acknowledged");
            Outcome::Failure
        }
    }
}

/// Decodes an `HGETALL` reply into a JSON object of its field/value pairs.
///
/// An empty reply means the hash does not exist, which is reported as [`Outcome::NotFound`]
/// rather than as an empty object.
pub fn hash_getall(reply: Value) -> Outcome {
    let items = match reply {
        Value::Array(items) => items,
        Value::Map(pairs) => pairs.into_iter().flat_map(|(k, v)| [k, v]).collect(),
        other => {
            warn!(reply = ?other, "HGETALL reply is not an array");
            return Outcome::Failure;
        }
    };
    if items.is_empty() {
        return Outcome::NotFound;
    }
    if items.len() % 2 != 0 {
        return Outcome::Failure;
    }

    let mut record = Map::new();
    for pair in items.chunks(2) {
        match (as_string(&pair[0]), as_string(&pair[1])) {
            (Some(field), Some(value)) => {
                record.insert(field, serde_json::Value::String(value));
            }
            _ => return Outcome::Failure,
        }
    }
    Outcome::Success(serde_json::Value::Object(record).to_string())
}

/// Decodes an `HGET` reply. The stored value is returned as-is
pub fn hash_get(reply: Value) -> Outcome {
    match reply {
        Value::Nil => Outcome::NotFound,
        other => match as_string(&other) {
            Some(s) => Outcome::Success(s),
            None => Outcome::Failure,
        },
    }
}

/// decodes one `HSCAN` page of a machine's file index
pub fn scan_files(reply: Value) -> Outcome {
    hash_scan(reply, "files")
}

/// decodes one `HSCAN` page of a file's trace entries
pub fn scan_traces(reply: Value) -> Outcome {
    hash_scan(reply, "traces")
}

/// Decodes a two element `HSCAN` reply, `[cursor, [field, value, ...]]`, into
/// `{"page": <cursor>, "<list>": [<value>, ...]}`.
///
/// Every value is itself JSON and is embedded as such. Pairs with a non string field or
/// value, and values that are not valid JSON, are skipped.
fn hash_scan(reply: Value, list: &str) -> Outcome {
    let (cursor, entries) = match reply {
        Value::Array(mut parts) if parts.len() == 2 => {
            let entries = parts.pop();
            let cursor = parts.pop();
            match (cursor, entries) {
                (Some(cursor), Some(Value::Array(entries))) => (cursor, entries),
                _ => return Outcome::Failure,
            }
        }
        other => {
            warn!(reply = ?other, "HSCAN reply is not a two element array");
            return Outcome::Failure;
        }
    };

    let page = match as_string(&cursor).and_then(|c| c.parse::<u64>().ok()) {
        Some(page) => page,
        None => {
            warn!(?cursor, "HSCAN cursor is not an unsigned integer");
            return Outcome::Failure;
        }
    };

    let items: Vec<serde_json::Value> = entries
        .chunks_exact(2)
        .filter(|pair| is_string(&pair[0]))
        .filter_map(|pair| as_string(&pair[1]))
        .filter_map(|value| serde_json::from_str(&value).ok())
        .collect();

    let mut body = Map::new();
    body.insert("page".to_string(), json!(page));
    body.insert(list.to_string(), serde_json::Value::Array(items));
    Outcome::Success(serde_json::Value::Object(body).to_string())
}

fn is_string(v: &Value) -> bool {
    matches!(v, Value::BulkString(_) | Value::SimpleString(_))
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}
