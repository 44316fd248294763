//! Environment and well-known directories.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn current_dir_impl(&self) -> Result<PathBuf> {
        env::current_dir().context("Failed to determine the current directory")
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};

    #[test]
    fn test_real_runtime_env_and_dirs() {
        let runtime = RealRuntime;

        // PATH exists on all supported systems
        assert!(runtime.env_var("PATH").is_ok());
        assert!(runtime.env_var("GHPM_SURELY_UNSET_VARIABLE").is_err());

        let home = runtime.home_dir();
        assert!(home.is_some() || cfg!(target_os = "linux")); // CI might not have home

        let cwd = runtime.current_dir().unwrap();
        assert!(cwd.is_absolute());
    }
}
