//! Line-delimited intermediate record stream: `key\tvalue\n` per pair.
//!
//! Round-trip lossless only when keys and values contain no `\t` or `\n` —
//! this matches the tab-separated-on-write, split-on-first-tab-on-read
//! contract in `worker/imd_codec.go` exactly.

use serde::{Deserialize, Serialize};

/// An ordered key/value pair, the unit of data the Map and Reduce
/// transforms exchange through the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Encode a run of key-value pairs as a line-delimited record stream.
/// Empty input encodes to the empty string.
pub fn encode(kvs: &[KeyValue]) -> String {
    if kvs.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(kvs.len() * 24);
    for kv in kvs {
        out.push_str(&kv.key);
        out.push('\t');
        out.push_str(&kv.value);
        out.push('\n');
    }
    out
}

/// Decode a record stream produced by [`encode`]. Trims surrounding
/// whitespace, splits on `\n`, drops empty lines, and splits each
/// remaining line on the *first* tab only — values may contain any
/// non-newline character, including further tabs. Lines without a tab
/// are dropped silently.
pub fn decode(raw: &str) -> Vec<KeyValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split('\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let key = parts.next()?;
            let value = parts.next()?;
            Some(KeyValue::new(key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_trips_to_empty() {
        assert_eq!(encode(&[]), "");
        assert!(decode("").is_empty());
        assert!(decode("   \n  ").is_empty());
    }

    #[test]
    fn round_trip_without_embedded_delimiters() {
        let kvs = vec![
            KeyValue::new("A", "7"),
            KeyValue::new("B", "5"),
            KeyValue::new("with space", "still one value"),
        ];
        let decoded = decode(&encode(&kvs));
        assert_eq!(decoded, kvs);
    }

    #[test]
    fn value_may_contain_further_tabs() {
        let kvs = vec![KeyValue::new("k", "v1\tv2")];
        let decoded = decode(&encode(&kvs));
        assert_eq!(decoded, kvs);
    }

    #[test]
    fn lines_without_a_tab_are_dropped() {
        let raw = "A\t1\nmalformed-no-tab\nB\t2\n";
        let decoded = decode(raw);
        assert_eq!(decoded, vec![KeyValue::new("A", "1"), KeyValue::new("B", "2")]);
    }
}
