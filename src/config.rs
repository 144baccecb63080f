// layered settings: defaults, optional toml file, PLANKERNEL__ environment
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "plankernel.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
}

/// How sub-plan threads are spawned.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ThreadSettings {
    pub stack_size: usize,
    pub name_prefix: String,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self { stack_size: 2 * 1024 * 1024, name_prefix: "plan-thread".into() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ExplainSettings {
    pub data: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub log: LogSettings,
    pub thread: ThreadSettings,
    pub explain: ExplainSettings,
}

impl Settings {
    /// Reads `path` (or `plankernel.toml` when none is given, in which case a
    /// missing file is fine) on top of the defaults, then the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = ThreadSettings::default();
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .set_default("log.filter", "info")?
            .set_default("thread.stack_size", defaults.stack_size as i64)?
            .set_default("thread.name_prefix", defaults.name_prefix)?
            .set_default("explain.data", false)?
            .add_source(file)
            .add_source(Environment::with_prefix("PLANKERNEL").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogSettings { filter: "info".into() },
            thread: ThreadSettings::default(),
            explain: ExplainSettings::default(),
        }
    }
}
