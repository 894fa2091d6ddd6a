use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use redis::Value;
use tracing::debug;

use super::StoreEngine;
use crate::{KsError, Result};

// scan page size when a HSCAN does not give a COUNT, same as redis
const DEFAULT_SCAN_COUNT: usize = 10;

/// An in-memory [`StoreEngine`] that answers `HSET`, `HMSET`, `HGET`, `HGETALL` and `HSCAN`
/// with the same reply shapes a redis server would.
///
/// Hashes are kept in a concurrent map, keyed by hash name. Each hash keeps its fields
/// sorted, so an `HSCAN` cursor is simply the index of the next field to visit.
#[derive(Clone, Debug, Default)]
pub struct MemoryEngine {
    hashes: Arc<DashMap<String, BTreeMap<String, String>>>,
}

impl MemoryEngine {
    /// creates an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    fn hset(&self, key: &str, pairs: &[String]) -> Result<usize> {
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(wrong_arity("hset"));
        }
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        let added = pairs
            .chunks(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        Ok(added)
    }

    fn hget(&self, key: &str, field: &str) -> Value {
        self.hashes
            .get(key)
            .and_then(|hash| hash.get(field).map(|v| bulk(v)))
            .unwrap_or(Value::Nil)
    }

    fn hgetall(&self, key: &str) -> Value {
        let items: Vec<Value> = self
            .hashes
            .get(key)
            .map(|hash| hash.iter().flat_map(|(f, v)| [bulk(f), bulk(v)]).collect())
            .unwrap_or_default();
        Value::Array(items)
    }

    fn hscan(&self, key: &str, args: &[String]) -> Result<Value> {
        let (cursor, options) = args.split_first().ok_or_else(|| wrong_arity("hscan"))?;
        let cursor: usize = cursor
            .parse()
            .map_err(|_| KsError::Command("ERR invalid cursor".to_string()))?;

        let mut pattern = None;
        let mut count = DEFAULT_SCAN_COUNT;
        let mut opts = options.iter();
        while let Some(opt) = opts.next() {
            let value = opts.next().ok_or_else(|| KsError::Command("ERR syntax error".to_string()))?;
            match opt.to_ascii_uppercase().as_str() {
                "MATCH" => pattern = Some(value.as_str()),
                "COUNT" => {
                    count = value
                        .parse()
                        .ok()
                        .filter(|c| *c > 0)
                        .ok_or_else(|| KsError::Command("ERR value is not an integer or out of range".to_string()))?;
                }
                _ => return Err(KsError::Command("ERR syntax error".to_string())),
            }
        }

        let (next, items) = match self.hashes.get(key) {
            Some(hash) => {
                let end = cursor.saturating_add(count);
                let items: Vec<Value> = hash
                    .iter()
                    .skip(cursor)
                    .take(count)
                    .filter(|(field, _)| pattern.map_or(true, |p| glob_match(p.as_bytes(), field.as_bytes())))
                    .flat_map(|(f, v)| [bulk(f), bulk(v)])
                    .collect();
                let next = if end >= hash.len() { 0 } else { end };
                (next, items)
            }
            None => (0, Vec::new()),
        };
        Ok(Value::Array(vec![bulk(&next.to_string()), Value::Array(items)]))
    }
}

impl StoreEngine for MemoryEngine {
    fn execute(&self, args: &[String]) -> Result<Value> {
        debug!(?args, "memory engine command");
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| KsError::Format("empty command".to_string()))?;

        match (name.to_ascii_uppercase().as_str(), rest) {
            ("HSET", [key, pairs @ ..]) => {
                let added = self.hset(key, pairs)?;
                Ok(Value::Int(added as i64))
            }
            ("HMSET", [key, pairs @ ..]) => {
                self.hset(key, pairs)?;
                Ok(Value::Okay)
            }
            ("HGET", [key, field]) => Ok(self.hget(key, field)),
            ("HGETALL", [key]) => Ok(self.hgetall(key)),
            ("HSCAN", [key, args @ ..]) => self.hscan(key, args),
            ("HSET", _) | ("HMSET", _) | ("HGET", _) | ("HGETALL", _) | ("HSCAN", _) => {
                Err(wrong_arity(&name.to_ascii_lowercase()))
            }
            (other, _) => Err(KsError::Command(format!("ERR unknown command '{}'", other))),
        }
    }
}

fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

fn wrong_arity(cmd: &str) -> KsError {
    KsError::Command(format!("ERR wrong number of arguments for '{}' command", cmd))
}

/// redis style glob matching, supporting `*`, `?` and literal characters
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => glob_match(rest, text) || (!text.is_empty() && glob_match(pattern, &text[1..])),
        (Some((b'?', rest)), Some((_, text_rest))) => glob_match(rest, text_rest),
        (Some((p, rest)), Some((t, text_rest))) if p == t => glob_match(rest, text_rest),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hset_counts_only_new_fields() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.execute(&cmd(&["HSET", "h", "a", "1"])).unwrap(), Value::Int(1));
        assert_eq!(engine.execute(&cmd(&["HSET", "h", "a", "2"])).unwrap(), Value::Int(0));
        assert_eq!(engine.execute(&cmd(&["HMSET", "h", "a", "3", "b", "4"])).unwrap(), Value::Okay);
        assert_eq!(engine.execute(&cmd(&["HGET", "h", "a"])).unwrap(), bulk("3"));
    }

    #[test]
    fn hget_missing_is_nil() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.execute(&cmd(&["HGET", "nope", "a"])).unwrap(), Value::Nil);
        assert_eq!(engine.execute(&cmd(&["HGETALL", "nope"])).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn hscan_walks_every_field_once() {
        let engine = MemoryEngine::new();
        for i in 0..25 {
            engine.execute(&cmd(&["HSET", "h", &format!("f{:02}", i), "v"])).unwrap();
        }

        let mut cursor = "0".to_string();
        let mut seen = 0;
        loop {
            let reply = engine.execute(&cmd(&["HSCAN", "h", &cursor, "COUNT", "10"])).unwrap();
            let Value::Array(parts) = reply else { panic!("not an array") };
            let Value::BulkString(next) = &parts[0] else { panic!("no cursor") };
            let Value::Array(items) = &parts[1] else { panic!("no items") };
            seen += items.len() / 2;
            cursor = String::from_utf8(next.clone()).unwrap();
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen, 25);
    }

    #[test]
    fn hscan_match_filters_fields() {
        let engine = MemoryEngine::new();
        engine.execute(&cmd(&["HSET", "h", "f1", "{}"])).unwrap();
        engine.execute(&cmd(&["HSET", "h", "trace:1", "{}"])).unwrap();
        engine.execute(&cmd(&["HSET", "h", "trace:2", "{}"])).unwrap();

        let reply = engine.execute(&cmd(&["HSCAN", "h", "0", "MATCH", "trace:*", "COUNT", "100"])).unwrap();
        let Value::Array(parts) = reply else { panic!("not an array") };
        assert_eq!(parts[0], bulk("0"));
        assert_eq!(parts[1], Value::Array(vec![bulk("trace:1"), bulk("{}"), bulk("trace:2"), bulk("{}")]));
    }

    #[test]
    fn unknown_and_malformed_commands_fail() {
        let engine = MemoryEngine::new();
        assert!(matches!(engine.execute(&cmd(&["DEL", "h"])), Err(KsError::Command(_))));
        assert!(matches!(engine.execute(&cmd(&["HSET", "h", "a"])), Err(KsError::Command(_))));
        assert!(matches!(engine.execute(&cmd(&["HGET", "h"])), Err(KsError::Command(_))));
        assert!(matches!(engine.execute(&[]), Err(KsError::Format(_))));
    }

    #[test]
    fn glob() {
        assert!(glob_match(b"trace:*", b"trace:123"));
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"t?ace:*", b"trace:"));
        assert!(!glob_match(b"trace:*", b"f1"));
    }
}
