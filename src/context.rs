//! # Context Propagation Store
//!
//! Per-task key/value scratch space that each rule step can read, mutate,
//! and forward to the child tasks it spawns. State learned at one step
//! (say, a play count harvested on the player page) rides the context into
//! the final record two hops later.
//!
//! ## Copy vs. share
//!
//! Children inherit the parent context in one of two explicit modes:
//!
//! - [`Context::deep_copy`]: an independent snapshot. Mutations by the child
//!   never retroactively affect the parent or any sibling.
//! - [`Context::share`]: an alias of the parent's store, for the case where
//!   the parent has finished mutating and merely forwards state downstream
//!   in the same logical request.
//!
//! Accidental aliasing is the classic failure mode of rule chains that rely
//! on sequential temp-field handoff, so the distinction is part of the API
//! surface rather than an implementation detail.

use crate::error::CrawlError;
use crate::value::Value;
use parking_lot::RwLock;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// A string-keyed bag of typed values scoped to one task lineage.
#[derive(Debug, Default)]
pub struct Context {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context pre-populated from `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let ctx = Context::new();
        for (k, v) in pairs {
            ctx.set(k, v);
        }
        ctx
    }

    /// Returns an independent snapshot of this context.
    ///
    /// The child may mutate its copy freely without the parent or any other
    /// copy observing the change.
    pub fn deep_copy(&self) -> Context {
        let snapshot = self.inner.read().clone();
        Context {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Returns an alias of this context. Mutations through either handle are
    /// visible through both.
    pub fn share(&self) -> Context {
        Context {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Returns a clone of the value at `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Reads an integer, falling back to `default` when the key is absent.
    ///
    /// A present value of any other type is a [`CrawlError::ContextTypeMismatch`].
    pub fn get_int(&self, key: &str, default: i64) -> Result<i64, CrawlError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_int().ok_or_else(|| CrawlError::ContextTypeMismatch {
                key: key.to_string(),
                expected: "int",
                found: v.type_name(),
            }),
        }
    }

    /// Reads a float (integers widen), falling back to `default` when absent.
    pub fn get_float(&self, key: &str, default: f64) -> Result<f64, CrawlError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_float().ok_or_else(|| CrawlError::ContextTypeMismatch {
                key: key.to_string(),
                expected: "float",
                found: v.type_name(),
            }),
        }
    }

    /// Reads a string, falling back to `default` when the key is absent.
    pub fn get_str(&self, key: &str, default: &str) -> Result<String, CrawlError> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(v) => match v.as_str() {
                Some(s) => Ok(s.to_string()),
                None => Err(CrawlError::ContextTypeMismatch {
                    key: key.to_string(),
                    expected: "string",
                    found: v.type_name(),
                }),
            },
        }
    }

    /// Merges `(key, value)` pairs into this context, overwriting collisions.
    pub fn merge<K, V, I>(&self, pairs: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut guard = self.inner.write();
        for (k, v) in pairs {
            guard.insert(k.into(), v.into());
        }
    }

    /// Returns a flat snapshot of the current contents.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Clone for Context {
    /// Cloning a `Context` aliases it, matching the cheap-handle semantics of
    /// the rest of the crate. Use [`Context::deep_copy`] for an independent
    /// snapshot.
    fn clone(&self) -> Self {
        self.share()
    }
}

// Checkpoints persist contexts as their flat snapshot; a shared alias
// collapses to an independent copy on restore.
impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = HashMap::<String, Value>::deserialize(deserializer)?;
        Ok(Context {
            inner: Arc::new(RwLock::new(map)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_isolates_child_mutations() {
        let parent = Context::new();
        parent.set("channel", 2);
        let child = parent.deep_copy();
        child.set("channel", 9);
        child.set("name", "child only");

        assert_eq!(parent.get_int("channel", 0).unwrap(), 2);
        assert_eq!(parent.get("name"), None);
        assert_eq!(child.get_int("channel", 0).unwrap(), 9);
    }

    #[test]
    fn siblings_do_not_observe_each_other() {
        let parent = Context::new();
        parent.set("play_count", 150_000_000i64);
        let a = parent.deep_copy();
        let b = parent.deep_copy();
        a.set("play_count", 1);

        assert_eq!(b.get_int("play_count", 0).unwrap(), 150_000_000);
        assert_eq!(parent.get_int("play_count", 0).unwrap(), 150_000_000);
    }

    #[test]
    fn share_aliases_the_store() {
        let parent = Context::new();
        parent.set("play_url", "abc123");
        let child = parent.share();
        child.set("detail_url", "def456");

        assert_eq!(parent.get_str("detail_url", "").unwrap(), "def456");
        assert_eq!(child.get_str("play_url", "").unwrap(), "abc123");
    }

    #[test]
    fn typed_read_with_default() {
        let ctx = Context::new();
        assert_eq!(ctx.get_int("missing", 7).unwrap(), 7);
        assert_eq!(ctx.get_str("missing", "x").unwrap(), "x");
    }

    #[test]
    fn type_mismatch_is_an_error_not_a_default() {
        let ctx = Context::new();
        ctx.set("channel", "movies");
        let err = ctx.get_int("channel", 0).unwrap_err();
        match err {
            CrawlError::ContextTypeMismatch { key, expected, found } => {
                assert_eq!(key, "channel");
                assert_eq!(expected, "int");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn concurrent_copy_mutation_is_isolated() {
        let parent = Context::new();
        parent.set("seq", 0);
        let mut handles = Vec::new();
        for i in 0..8i64 {
            let child = parent.deep_copy();
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    child.set("seq", i * 1000 + j);
                }
                child.get_int("seq", -1).unwrap()
            }));
        }
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), i as i64 * 1000 + 99);
        }
        assert_eq!(parent.get_int("seq", -1).unwrap(), 0);
    }
}
