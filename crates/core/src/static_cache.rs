//! A fixed-size cache populated lazily, one cell per key combination.

use std::{fmt, sync::OnceLock};

use crate::Error;

/// One axis (or a product of axes) of cache keys.
///
/// Keys are flattened row-major into a single index into the cache cells.
pub trait CacheKey {
    type Value: Copy + fmt::Debug;

    /// Number of distinct keys along this axis.
    fn size(&self) -> usize;

    /// Flattened index of `key`, or `None` if it is not a declared key.
    fn index(&self, key: Self::Value) -> Option<usize>;
}

/// Keys drawn from the half-open integer range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRange {
    pub start: usize,
    pub end: usize,
}

impl CacheRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl CacheKey for CacheRange {
    type Value = usize;

    fn size(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    fn index(&self, key: usize) -> Option<usize> {
        (self.start..self.end).contains(&key).then(|| key - self.start)
    }
}

/// Keys drawn from an explicit list of enumeration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEnumeration<E> {
    pub values: Vec<E>,
}

impl<E> CacheEnumeration<E> {
    pub fn new(values: impl Into<Vec<E>>) -> Self {
        Self {
            values: values.into(),
        }
    }
}

impl<E: Copy + PartialEq + fmt::Debug> CacheKey for CacheEnumeration<E> {
    type Value = E;

    fn size(&self) -> usize {
        self.values.len()
    }

    fn index(&self, key: E) -> Option<usize> {
        self.values.iter().position(|value| *value == key)
    }
}

macro_rules! impl_cache_key_for_tuple {
    ($($axis:ident => $idx:tt),+) => {
        impl<$($axis: CacheKey),+> CacheKey for ($($axis,)+) {
            type Value = ($($axis::Value,)+);

            fn size(&self) -> usize {
                1 $(* self.$idx.size())+
            }

            fn index(&self, key: Self::Value) -> Option<usize> {
                let mut flat = 0;
                $(flat = flat * self.$idx.size() + self.$idx.index(key.$idx)?;)+
                Some(flat)
            }
        }
    };
}

impl_cache_key_for_tuple!(A => 0);
impl_cache_key_for_tuple!(A => 0, B => 1);
impl_cache_key_for_tuple!(A => 0, B => 1, C => 2);

/// Values built on first access and kept for the cache's lifetime.
///
/// Each key combination is generated at most once; concurrent first accesses
/// to the same cell race to a single construction. Place the cache in a
/// `static` behind [`std::sync::LazyLock`] for process-wide memoization.
pub struct StaticCache<T, K: CacheKey, F> {
    keys: K,
    generator: F,
    cells: Box<[OnceLock<T>]>,
}

impl<T, K, F> StaticCache<T, K, F>
where
    K: CacheKey,
    F: Fn(K::Value) -> T,
{
    pub fn new(keys: K, generator: F) -> Self {
        let cells = (0..keys.size()).map(|_| OnceLock::new()).collect();
        Self {
            keys,
            generator,
            cells,
        }
    }

    /// Returns the cached value for `key`, generating it on first access.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` lies outside the declared key ranges.
    pub fn get(&self, key: K::Value) -> Result<&T, Error> {
        let cell = self
            .keys
            .index(key)
            .and_then(|idx| self.cells.get(idx))
            .ok_or_else(|| Error::InvalidCacheKey {
                key: format!("{key:?}"),
            })?;
        Ok(cell.get_or_init(|| (self.generator)(key)))
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }
}

impl<T, K: CacheKey + fmt::Debug, F> fmt::Debug for StaticCache<T, K, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let populated = self.cells.iter().filter(|c| c.get().is_some()).count();
        f.debug_struct("StaticCache")
            .field("keys", &self.keys)
            .field("populated", &populated)
            .finish_non_exhaustive()
    }
}
