//! Shared integration-test scaffolding: the optional `test-config.toml`
//! gate for tests that need a real, reachable MonetDB server.

use std::fs;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MonetdbConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

fn default_port() -> u16 {
    50000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestSettings {
    #[serde(default)]
    pub run_integration_tests: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    pub monetdb: MonetdbConfig,
    #[serde(default)]
    pub settings: TestSettings,
}

impl Default for TestSettings {
    fn default() -> Self {
        TestSettings {
            run_integration_tests: false,
        }
    }
}

const CONFIG_PATH: &str = "tests/test-config.toml";

/// Loads `tests/test-config.toml` relative to the crate root, returning
/// `None` if it is absent or fails to parse — this file is gitignored and
/// never required for the rest of the suite to pass.
pub fn load_test_config() -> Option<TestConfig> {
    let contents = fs::read_to_string(CONFIG_PATH).ok()?;
    toml::from_str(&contents).ok()
}

/// Gates a test on both the config file being present and
/// `run_integration_tests` being explicitly enabled in it. Prints setup
/// instructions and returns `(false, None)` otherwise.
pub fn should_run_integration_tests() -> (bool, Option<TestConfig>) {
    match load_test_config() {
        Some(config) if config.settings.run_integration_tests => (true, Some(config)),
        Some(_) => {
            println!("integration test skipped: run_integration_tests is false in tests/test-config.toml");
            (false, None)
        }
        None => {
            println!(
                "integration test skipped: create {} to run against a real server, e.g.\n\
                 [monetdb]\n\
                 host = \"localhost\"\n\
                 port = 50000\n\
                 database = \"demo\"\n\
                 user = \"monetdb\"\n\
                 password = \"monetdb\"\n\
                 \n\
                 [settings]\n\
                 run_integration_tests = true",
                CONFIG_PATH
            );
            (false, None)
        }
    }
}
