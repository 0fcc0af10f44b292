// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. dynamics.yaml file
//! 3. Environment variables (QUBITOS_DYNAMICS_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::array::ArrayLibrary;
use crate::error::{Error, Result};
use crate::solvers::{Method, SolverOptions};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default solver settings
    #[serde(default)]
    pub solver: SolverConfig,

    /// Array storage settings
    #[serde(default)]
    pub array: ArrayConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// An explicit path that does not exist yields the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &["dynamics.yaml", "dynamics.yml"] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides. Unparseable values are ignored
    /// with a warning.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("QUBITOS_DYNAMICS_METHOD") {
            self.solver.method = val;
        }
        if let Some(atol) = parse_env("QUBITOS_DYNAMICS_ATOL") {
            self.solver.options.atol = atol;
        }
        if let Some(rtol) = parse_env("QUBITOS_DYNAMICS_RTOL") {
            self.solver.options.rtol = rtol;
        }
        if let Some(max_dt) = parse_env("QUBITOS_DYNAMICS_MAX_DT") {
            self.solver.options.max_dt = Some(max_dt);
        }
        if let Some(max_steps) = parse_env("QUBITOS_DYNAMICS_MAX_STEPS") {
            self.solver.options.max_steps = max_steps;
        }
        if let Some(k_dim) = parse_env("QUBITOS_DYNAMICS_K_DIM") {
            self.solver.options.k_dim = Some(k_dim);
        }
        if let Ok(val) = env::var("QUBITOS_DYNAMICS_COMPILE") {
            self.solver.options.compile = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(library) = parse_env("QUBITOS_DYNAMICS_ARRAY_LIBRARY") {
            self.array.library = library;
        }
        if let Ok(val) = env::var("QUBITOS_DYNAMICS_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("QUBITOS_DYNAMICS_LOG_FORMAT") {
            self.logging.format = val;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.solver.method()?;
        self.solver
            .options
            .validate()
            .map_err(|e| Error::Config(format!("solver: {}", e)))?;
        if !matches!(self.logging.format.as_str(), "pretty" | "compact") {
            return Err(Error::Config(format!(
                "logging.format must be 'pretty' or 'compact', got '{}'",
                self.logging.format
            )));
        }
        if self.solver.options.compile && self.array.library == ArrayLibrary::Sparse {
            tracing::warn!(
                "compile is enabled but the sparse array library does not support \
                 compiled step kernels; steps will run uncompiled"
            );
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let val = env::var(name).ok()?;
    match val.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(variable = name, value = %val, "ignoring unparseable override");
            None
        }
    }
}

/// Solver defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Method tag (see [`Method::tags`])
    #[serde(default = "default_method")]
    pub method: String,

    /// Tolerances, step limits and method parameters
    #[serde(flatten)]
    pub options: SolverOptions,
}

impl SolverConfig {
    pub fn method(&self) -> Result<Method> {
        self.method
            .parse()
            .map_err(|e| Error::Config(format!("solver.method: {}", e)))
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            options: SolverOptions::default(),
        }
    }
}

fn default_method() -> String {
    "RK45".into()
}

/// Array configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Default library for operators built from simulation files
    #[serde(default)]
    pub library: ArrayLibrary,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.solver.method, "RK45");
        assert_eq!(config.solver.options, SolverOptions::default());
        assert_eq!(config.array.library, ArrayLibrary::Dense);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut bad_config = Config::default();
        bad_config.solver.method = "euler".into();
        assert!(bad_config.validate().is_err());

        let mut bad_config = Config::default();
        bad_config.solver.options.atol = 0.0;
        let msg = format!("{}", bad_config.validate().unwrap_err());
        assert!(msg.contains("atol"));
    }

    #[test]
    fn test_config_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
solver:
  method: lanczos_diag
  max_dt: 0.01
  k_dim: 12
  atol: 1.0e-10
array:
  library: scipy_sparse
"#
        )
        .unwrap();

        let config = Config::load(Some(f.path())).unwrap();
        assert!(matches!(config.solver.method().unwrap(), Method::LanczosDiag));
        assert_eq!(config.solver.options.max_dt, Some(0.01));
        assert_eq!(config.solver.options.k_dim, Some(12));
        assert_eq!(config.solver.options.atol, 1e-10);
        assert_eq!(config.solver.options.rtol, 1e-8);
        assert_eq!(config.array.library, ArrayLibrary::Sparse);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let path = std::path::Path::new("/tmp/does_not_exist_qubitos_dynamics_test.yaml");
        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.solver.method, "RK45");
    }

    #[test]
    fn test_config_load_invalid_yaml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "{{{{not: valid: yaml::::").unwrap();

        let result = Config::load(Some(f.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override_method() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_DYNAMICS_METHOD", "expm");
        config.apply_env_overrides();
        assert_eq!(config.solver.method, "expm");
        std::env::remove_var("QUBITOS_DYNAMICS_METHOD");
    }

    #[test]
    fn test_env_override_max_dt() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_DYNAMICS_MAX_DT", "0.5");
        config.apply_env_overrides();
        assert_eq!(config.solver.options.max_dt, Some(0.5));
        std::env::remove_var("QUBITOS_DYNAMICS_MAX_DT");
    }

    #[test]
    fn test_env_override_unparseable_is_ignored() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_DYNAMICS_MAX_STEPS", "many");
        config.apply_env_overrides();
        assert_eq!(config.solver.options.max_steps, 100_000);
        std::env::remove_var("QUBITOS_DYNAMICS_MAX_STEPS");
    }

    #[test]
    fn test_env_override_array_library() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_DYNAMICS_ARRAY_LIBRARY", "csr");
        config.apply_env_overrides();
        assert_eq!(config.array.library, ArrayLibrary::Sparse);
        std::env::remove_var("QUBITOS_DYNAMICS_ARRAY_LIBRARY");
    }

    #[test]
    fn test_env_override_log_level() {
        let mut config = Config::default();
        std::env::set_var("QUBITOS_DYNAMICS_LOG_LEVEL", "debug");
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "debug");
        std::env::remove_var("QUBITOS_DYNAMICS_LOG_LEVEL");
    }

    #[test]
    fn test_validate_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        let msg = format!("{}", config.validate().unwrap_err());
        assert!(msg.contains("logging.format"));
    }

    #[test]
    fn test_validate_sparse_compile_still_passes() {
        let mut config = Config::default();
        config.array.library = ArrayLibrary::Sparse;
        // Should warn but still pass validation
        assert!(config.validate().is_ok());
    }
}
