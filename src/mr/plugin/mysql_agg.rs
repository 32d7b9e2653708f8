//! Sums all numeric `metric` values per key. See
//! `original_source/mrapps/mysql_agg.go`.

use crate::mr::sink::Sink;

use super::{MapFn, ReduceFn};

pub struct Map;

impl MapFn for Map {
    fn call(&self, _filename: &str, content: &str, sink: &Sink) {
        for line in content.trim().split('\n') {
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                continue;
            }
            sink.emit_intermediate(parts[1], parts[2]);
        }
    }
}

pub struct Reduce;

impl ReduceFn for Reduce {
    fn call(&self, key: &str, values: &[String], sink: &Sink) {
        let total: i64 = values
            .iter()
            .filter_map(|v| v.trim().parse::<i64>().ok())
            .sum();
        sink.emit(key, total.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_numeric_values() {
        let (sink, mut rx) = Sink::channel();
        let values = vec!["1".to_string(), "1".to_string(), "2".to_string()];
        Reduce.call("a", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "4");
    }

    #[test]
    fn ignores_unparsable_values() {
        let (sink, mut rx) = Sink::channel();
        let values = vec!["5".to_string(), "not-a-number".to_string()];
        Reduce.call("a", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "5");
    }
}
