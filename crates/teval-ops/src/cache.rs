//! Process-wide cache of compiled lambdas.
//!
//! Lambdas are keyed structurally: two plans that embed the same lambda body
//! share one compiled artifact. Entries are evicted least-recently-used once
//! the cache holds `capacity` entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use teval_core::config::EvalConfig;
use teval_core::expr::Lambda;
use teval_core::hash::Fingerprint;

use crate::lambda::{CompiledLambda, LambdaError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry {
    compiled: Arc<CompiledLambda>,
    last_used: u64,
}

#[derive(Debug)]
pub struct LambdaCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<Fingerprint, Entry>,
    stats: CacheStats,
}

impl LambdaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Change the capacity, evicting least-recently-used entries until the
    /// cache fits.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Return the compiled form of `lambda`, compiling it on a miss.
    /// Lambdas that do not compile are not cached.
    pub fn get_or_compile(&mut self, lambda: &Lambda) -> Result<Arc<CompiledLambda>, LambdaError> {
        let key = structural_key(lambda)?;
        self.tick += 1;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.tick;
            self.stats.hits += 1;
            #[cfg(feature = "tracing")]
            tracing::trace!(key = %key.short(), "lambda cache hit");
            return Ok(entry.compiled.clone());
        }

        self.stats.misses += 1;
        let compiled = Arc::new(CompiledLambda::compile(lambda)?);
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Entry {
                compiled: compiled.clone(),
                last_used: self.tick,
            },
        );
        #[cfg(feature = "tracing")]
        tracing::trace!(key = %key.short(), steps = compiled.steps().len(), "lambda compiled");
        Ok(compiled)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| *k);
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Cache key of a lambda: the fingerprint of its arity and body. Number
/// constants enter the key bit for bit, so `NaN`, `inf` and `-inf` stay
/// distinct.
pub fn structural_key(lambda: &Lambda) -> Result<Fingerprint, LambdaError> {
    Ok(Fingerprint::of(lambda)?)
}

static GLOBAL: Lazy<Mutex<LambdaCache>> =
    Lazy::new(|| Mutex::new(LambdaCache::new(EvalConfig::from_env().lambda_cache_capacity)));

/// Compile through the process-wide cache, sized by
/// `cfg.lambda_cache_capacity`. The most recent config wins.
pub fn compile_cached(
    lambda: &Lambda,
    cfg: &EvalConfig,
) -> Result<Arc<CompiledLambda>, LambdaError> {
    let mut cache = GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if cache.capacity() != cfg.lambda_cache_capacity.max(1) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            from = cache.capacity(),
            to = cfg.lambda_cache_capacity,
            "lambda cache resized"
        );
        cache.set_capacity(cfg.lambda_cache_capacity);
    }
    cache.get_or_compile(lambda)
}

/// Capacity of the process-wide cache.
pub fn global_capacity() -> usize {
    GLOBAL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .capacity()
}

/// Counters of the process-wide cache.
pub fn global_stats() -> CacheStats {
    GLOBAL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .stats()
}
