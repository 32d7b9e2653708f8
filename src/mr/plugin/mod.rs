//! Capability interface for user Map/Reduce transforms, and a name-keyed
//! registry of built-in ones.
//!
//! The system this was ported from loads `Map`/`Reduce` symbols at
//! runtime from a `.so` file via Go's `plugin` package (see
//! `worker/mainInterface.go::loadPlugin`). Rust has no equivalent
//! hot-swap mechanism with the same ABI guarantees — `rustc`'s ABI is
//! unstable across compiler versions, so loading a `cdylib` built by a
//! different toolchain is unsound in general. This rewrite uses
//! compile-time linkage instead: a small set of built-in transforms
//! behind a name-keyed registry, all implementing the same capability
//! interface.

mod count;
mod mysql_agg;
mod mysql_minmax;
mod mysql_topn;

use crate::mr::sink::Sink;
use std::sync::Arc;

/// A user Map transform: reads one input shard's text and emits zero or
/// more intermediate pairs onto `sink`.
pub trait MapFn: Send + Sync {
    fn call(&self, filename: &str, content: &str, sink: &Sink);
}

/// A user Reduce transform: reduces every value observed for one key and
/// emits exactly one pair onto `sink`.
pub trait ReduceFn: Send + Sync {
    fn call(&self, key: &str, values: &[String], sink: &Sink);
}

#[derive(Clone)]
pub struct Plugin {
    pub name: &'static str,
    pub map: Arc<dyn MapFn>,
    pub reduce: Arc<dyn ReduceFn>,
}

/// Look up a built-in plugin by name. Returns `None` for unknown names;
/// callers surface that as `MrError::UnknownPlugin`.
pub fn lookup(name: &str) -> Option<Plugin> {
    match name {
        "count" => Some(Plugin {
            name: "count",
            map: Arc::new(count::Map),
            reduce: Arc::new(count::Reduce),
        }),
        "mysql_agg" => Some(Plugin {
            name: "mysql_agg",
            map: Arc::new(mysql_agg::Map),
            reduce: Arc::new(mysql_agg::Reduce),
        }),
        "mysql_minmax" => Some(Plugin {
            name: "mysql_minmax",
            map: Arc::new(mysql_minmax::Map),
            reduce: Arc::new(mysql_minmax::Reduce),
        }),
        "mysql_topn" => Some(Plugin {
            name: "mysql_topn",
            map: Arc::new(mysql_topn::Map),
            reduce: Arc::new(mysql_topn::Reduce),
        }),
        _ => None,
    }
}

/// Valid plugin identifiers are lowercase ascii words, optionally
/// underscore-separated — e.g. `mysql_topn`. Anything else is a
/// configuration error, not a missing-plugin error.
pub fn valid_identifier(name: &str) -> bool {
    static PATTERN: once_identifier::OnceLock = once_identifier::OnceLock::new();
    PATTERN.get(name)
}

/// Small helper module so the regex is compiled once per process rather
/// than on every `valid_identifier` call.
mod once_identifier {
    use regex::Regex;
    use std::sync::OnceLock as StdOnceLock;

    pub struct OnceLock(StdOnceLock<Regex>);

    impl OnceLock {
        pub const fn new() -> Self {
            Self(StdOnceLock::new())
        }

        pub fn get(&self, name: &str) -> bool {
            self.0
                .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
                .is_match(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_plugins_resolve() {
        for name in ["count", "mysql_agg", "mysql_minmax", "mysql_topn"] {
            assert!(lookup(name).is_some(), "{name} should resolve");
        }
    }

    #[test]
    fn unknown_plugin_is_none() {
        assert!(lookup("does-not-exist").is_none());
    }

    #[test]
    fn identifier_validation() {
        assert!(valid_identifier("mysql_topn"));
        assert!(valid_identifier("count"));
        assert!(!valid_identifier("Mysql_Topn"));
        assert!(!valid_identifier("has space"));
        assert!(!valid_identifier(""));
        assert!(!valid_identifier("1starts_with_digit"));
    }
}
