//! Deterministic key-to-reducer routing.
//!
//! Map and reduce workers may be separate processes (and could in
//! principle live on separate hosts), so the hash here
//! has to be a fixed, from-scratch algorithm rather than anything seeded
//! or randomized at process start — `std::collections::hash_map::
//! DefaultHasher` is explicitly unsuitable since its seed is randomized
//! per-process. FNV-1a is cheap, has no crate in this workspace's
//! dependency graph, and is trivial to reimplement identically wherever
//! it's needed.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Map `key` to a reducer index in `[0, r)`. Pure, deterministic, stable
/// across processes and restarts. `r` must be >= 1 — calling with `r == 0`
/// is a programmer error and panics.
pub fn partition(key: &str, r: usize) -> usize {
    assert!(r > 0, "partition: r must be > 0");
    let hash = fnv1a32(key.as_bytes()) & 0x7fff_ffff;
    (hash as usize) % r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_repeated_calls() {
        let first = partition("same-key", 8);
        for _ in 0..100 {
            assert_eq!(partition("same-key", 8), first);
        }
    }

    #[test]
    fn always_in_range() {
        let keys = ["a", "b", "c", "foo", "bar", "baz", "k1", "k2", "k3", ""];
        for key in keys {
            let p = partition(key, 7);
            assert!(p < 7);
        }
    }

    #[test]
    fn empty_key_is_legal() {
        let p = partition("", 3);
        assert!(p < 3);
    }

    #[test]
    #[should_panic(expected = "r must be > 0")]
    fn zero_reducers_panics() {
        partition("k", 0);
    }
}
