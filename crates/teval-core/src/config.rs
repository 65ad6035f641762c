//! Evaluator configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Run the rewrite pipeline between building and lowering.
    pub optimize: bool,

    /// Lower embedded lambdas to compiled artifacts when possible. When false,
    /// every lambda runs through the portable tree-walk path.
    pub compile_lambdas: bool,

    /// Maximum number of compiled lambdas kept in the process-wide cache.
    pub lambda_cache_capacity: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            compile_lambdas: true,
            lambda_cache_capacity: 1024,
        }
    }
}

impl EvalConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TEVAL_OPTIMIZE`: `true`/`false`
    /// - `TEVAL_COMPILE_LAMBDAS`: `true`/`false`
    /// - `TEVAL_LAMBDA_CACHE_CAPACITY`: number of cached lambdas
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("TEVAL_OPTIMIZE") {
            if let Some(v) = parse_flag(&s) {
                cfg.optimize = v;
            }
        }

        if let Ok(s) = std::env::var("TEVAL_COMPILE_LAMBDAS") {
            if let Some(v) = parse_flag(&s) {
                cfg.compile_lambdas = v;
            }
        }

        if let Ok(s) = std::env::var("TEVAL_LAMBDA_CACHE_CAPACITY") {
            if let Some(v) = s.trim().parse::<usize>().ok().filter(|v| *v > 0) {
                cfg.lambda_cache_capacity = v;
            }
        }

        cfg
    }

    /// Reject settings the evaluator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.lambda_cache_capacity == 0 {
            return Err(Error::Config(
                "lambda_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
