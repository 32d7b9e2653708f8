//! Nth-largest numeric value per key, N from `MYSQL_TOPN_N` (default 3).
//! Clamps to the smallest available value when N exceeds the count.
//! See `original_source/mrapps/mysql_topn.go`.

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
        let n: usize = std::env::var("MYSQL_TOPN_N")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(3);

        let mut nums: Vec<i64> = values
            .iter()
            .filter_map(|v| v.trim().parse::<i64>().ok())
            .collect();
        if nums.is_empty() {
            sink.emit(key, "0");
            return;
        }

        nums.sort_unstable_by(|a, b| b.cmp(a));
        let idx = (n - 1).min(nums.len() - 1);
        sink.emit(key, nums[idx].to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_largest_with_n_2() {
        std::env::set_var("MYSQL_TOPN_N", "2");
        let (sink, mut rx) = Sink::channel();
        let values = vec!["5", "1", "3", "9", "2"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        Reduce.call("K", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "5");
        std::env::remove_var("MYSQL_TOPN_N");
    }

    #[test]
    fn n_beyond_len_clamps_to_smallest() {
        std::env::set_var("MYSQL_TOPN_N", "100");
        let (sink, mut rx) = Sink::channel();
        let values = vec!["5", "1", "3"].into_iter().map(String::from).collect::<Vec<_>>();
        Reduce.call("K", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "1");
        std::env::remove_var("MYSQL_TOPN_N");
    }

    #[test]
    fn default_n_is_3() {
        std::env::remove_var("MYSQL_TOPN_N");
        let (sink, mut rx) = Sink::channel();
        let values = vec!["5", "1", "3", "9", "2"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        Reduce.call("K", &values, &sink);
        assert_eq!(rx.try_recv().unwrap().value, "3");
    }
}
