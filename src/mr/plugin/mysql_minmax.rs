//! Per-key min/max/range over numeric values, mode selected by the
//! `MYSQL_MINMAX_MODE` environment variable (`min|max|range`, default
//! `max`). See `original_source/mrapps/mysql_minmax.go`.

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
        let nums: Vec<i64> = values
            .iter()
            .filter_map(|v| v.trim().parse::<i64>().ok())
            .collect();
        if nums.is_empty() {
            sink.emit(key, "0");
            return;
        }

        let min_v = *nums.iter().min().unwrap();
        let max_v = *nums.iter().max().unwrap();

        let mode = std::env::var("MYSQL_MINMAX_MODE")
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let out = match mode.as_str() {
            "min" => min_v,
            "range" => max_v - min_v,
            _ => max_v,
        };
        sink.emit(key, out.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_mode_is_max_minus_min() {
        std::env::set_var("MYSQL_MINMAX_MODE", "range");
        let (sink, mut rx) = Sink::channel();
        let values = vec!["4", "10", "2", "7"].into_iter().map(String::from).collect::<Vec<_>>();
        Reduce.call("K", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "8");
        std::env::remove_var("MYSQL_MINMAX_MODE");
    }

    #[test]
    fn default_mode_is_max() {
        std::env::remove_var("MYSQL_MINMAX_MODE");
        let (sink, mut rx) = Sink::channel();
        let values = vec!["4", "10", "2"].into_iter().map(String::from).collect::<Vec<_>>();
        Reduce.call("K", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "10");
    }

    #[test]
    fn no_numeric_values_emits_zero() {
        let (sink, mut rx) = Sink::channel();
        Reduce.call("K", &[], &sink);
        assert_eq!(rx.try_recv().unwrap().value, "0");
    }
}
