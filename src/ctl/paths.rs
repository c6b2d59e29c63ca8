//! Well-known locations under the nodectl home directory.

use std::env;
use std::path::{Path, PathBuf};

pub(crate) const HOME_ENV_VAR: &str = "NODECTL_HOME";
const HOME_DIR_NAME: &str = ".nodectl";

/// Resolve the home directory: explicit value, then `NODECTL_HOME`, then
/// `~/.nodectl` (or `./.nodectl` when no user home is known).
pub fn resolve_home(param: Option<PathBuf>) -> PathBuf {
    param
        .or_else(|| env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(HOME_DIR_NAME)
        })
}

/// Stored credentials.
pub fn config_file(home: &Path) -> PathBuf {
    home.join("db").join("config.json")
}

pub fn log_dir(home: &Path) -> PathBuf {
    home.join("log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::config::tests::{ENV_TEST_MUTEX, remove_env, set_env};

    #[test]
    fn test_param_wins() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        // SAFETY: Holding ENV_TEST_MUTEX
        unsafe { set_env(HOME_ENV_VAR, "/from/env") };
        let result = resolve_home(Some(PathBuf::from("/explicit")));
        // SAFETY: Holding ENV_TEST_MUTEX
        unsafe { remove_env(HOME_ENV_VAR) };
        assert_eq!(result, PathBuf::from("/explicit"));
    }

    #[test]
    fn test_env_then_default() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        // SAFETY: Holding ENV_TEST_MUTEX
        unsafe { set_env(HOME_ENV_VAR, "/from/env") };
        let from_env = resolve_home(None);
        // SAFETY: Holding ENV_TEST_MUTEX
        unsafe { remove_env(HOME_ENV_VAR) };
        assert_eq!(from_env, PathBuf::from("/from/env"));
        assert!(resolve_home(None).ends_with(HOME_DIR_NAME));
    }

    #[test]
    fn test_layout() {
        let home = Path::new("/srv/nodectl");
        assert_eq!(config_file(home), PathBuf::from("/srv/nodectl/db/config.json"));
        assert_eq!(log_dir(home), PathBuf::from("/srv/nodectl/log"));
    }
}
