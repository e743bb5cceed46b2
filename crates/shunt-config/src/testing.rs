//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated project directory with its own `.shunt/config.toml`
//! - Fixture files for redirect rules to match against
//! - The environment a child process needs to load the layer
//!
//! # Usage
//!
//! ```ignore
//! use shunt_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! let data = env.create_file("data.txt", b"real contents")?;
//! env.write_config(&config)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Project root for the test
    pub project_root: PathBuf,
    /// `.shunt` directory inside the project
    pub config_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;

        let project_root = temp_dir.path().join(format!("project-{test_id}"));
        let config_dir = project_root.join(".shunt");
        std::fs::create_dir_all(&config_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_root,
            config_dir,
            test_id,
        })
    }

    /// Path of the project-local config file
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Serialize `config` to the project-local config file
    pub fn write_config(&self, config: &Config) -> anyhow::Result<PathBuf> {
        let path = self.config_path();
        std::fs::write(&path, toml::to_string_pretty(config)?)?;
        Ok(path)
    }

    /// Load config the way the layer does, rooted in this environment
    pub fn load_config(&self, env: &[(&str, &str)]) -> anyhow::Result<Config> {
        let lookup = |key: &str| {
            env.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };
        Ok(Config::load_from(None, &self.config_path(), lookup)?)
    }

    /// Environment for spawning a child with the layer preloaded.
    ///
    /// Writes `config` first so the child sees the same rules.
    pub fn layer_env(&self, config: &Config, library: &Path) -> anyhow::Result<Vec<(String, String)>> {
        let config_file = self.write_config(config)?;
        let mut env = config.layer_env(&config_file);
        env.push((crate::preload_var().to_string(), library.display().to_string()));
        Ok(env)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleConfig;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.project_root.exists());
        assert!(env.config_dir.exists());
    }

    #[test]
    fn test_environment_is_unique() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.project_root, env2.project_root);
        assert_ne!(env1.test_id, env2.test_id);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("nested/data.txt", b"hello").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[test]
    fn test_write_then_load_config() {
        let env = TestEnvironment::new().unwrap();
        let mut config = Config::default();
        config.redirect.rules.push(RuleConfig::exact("data.txt", "fake"));
        env.write_config(&config).unwrap();

        let loaded = env.load_config(&[]).unwrap();
        assert_eq!(loaded.redirect.rules, config.redirect.rules);
    }

    #[test]
    fn test_layer_env_names_library() {
        let env = TestEnvironment::new().unwrap();
        let vars = env
            .layer_env(&Config::default(), Path::new("/opt/libshunt_layer.so"))
            .unwrap();
        assert!(vars
            .iter()
            .any(|(k, v)| k == crate::preload_var() && v == "/opt/libshunt_layer.so"));
        assert!(vars.iter().any(|(k, _)| k == crate::ENV_CONFIG));
    }
}
