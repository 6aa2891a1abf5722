//! Fx hash map and set aliases.
//!
//! Sibship lookups key on canonical path strings, which the Fx hash from
//! `rustc-hash` handles faster than the standard SipHash. Keys come from the
//! local filesystem, so denial-of-service resistance is not needed.
//!
//! # Examples
//!
//! ```
//! use sc_core::{FxHashMap, fx_hash_map};
//!
//! let mut by_canonical: FxHashMap<&str, usize> = fx_hash_map();
//! by_canonical.insert("/sync/a.txt", 0);
//! assert_eq!(by_canonical.get("/sync/a.txt"), Some(&0));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}
