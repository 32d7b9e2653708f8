//! Rows-per-key over TSV input `id\tkey\tmetric`. See
//! `original_source/mrapps/count.go`.

use std::collections::HashMap;

use crate::mr::sink::Sink;

use super::{MapFn, ReduceFn};

pub struct Map;

impl MapFn for Map {
    fn call(&self, _filename: &str, content: &str, sink: &Sink) {
        let mut local: HashMap<&str, u64> = HashMap::new();
        for line in content.trim().split('\n') {
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                continue;
            }
            *local.entry(parts[1]).or_insert(0) += 1;
        }
        for (key, count) in local {
            sink.emit_intermediate(key, count.to_string());
        }
    }
}

pub struct Reduce;

impl ReduceFn for Reduce {
    fn call(&self, key: &str, values: &[String], sink: &Sink) {
        let mut sum: i64 = 0;
        for v in values {
            match v.trim().parse::<i64>() {
                Ok(n) => sum += n,
                // Backward compatibility with callers that emit one
                // value per row instead of a pre-summed count.
                Err(_) => sum += 1,
            }
        }
        sink.emit(key, sum.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_counts_rows_per_key() {
        let (sink, mut rx) = Sink::channel();
        Map.call("f", "1\tA\t3\n2\tB\t5\n3\tA\t4\n", &sink);
        drop(sink);
        let mut emitted = Vec::new();
        while let Ok(kv) = rx.try_recv() {
            emitted.push(kv);
        }
        assert_eq!(emitted.len(), 2);
    }

    #[test]
    fn reduce_falls_back_to_counting_unparsable_values() {
        let (sink, mut rx) = Sink::channel();
        let values = vec!["x".to_string(), "y".to_string()];
        Reduce.call("A", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "2");
    }
}
