//! Environment-driven harness configuration.
//!
//! # Responsibility
//! - Read the slot policy source and runtime bounds from the environment.
//! - Convert raw values into validated harness settings.
//!
//! # Invariants
//! - Timeouts are never zero.
//! - At least two collection cycles run before verification.

use crate::host::artifact::ARTIFACT_DIR_NAME;
use crate::inventory::SlotPolicy;
use crate::model::slot::{PluginId, Slot};
use envconfig::Envconfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Lower bound on forced collection cycles before verification.
pub const MIN_COLLECTION_CYCLES: u32 = 2;
/// Run name used for the aggregate test and artifact pointers.
pub const DEFAULT_RUN_NAME: &str = "testDynamicSlots";

static SLOT_LIST_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;\s]+").expect("valid slot list separator regex"));

/// Raw configuration as read from the environment.
#[derive(Envconfig, Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Override flag: verify every dynamic slot.
    #[envconfig(from = "UNLOAD_VERIFIER_ALL_DYNAMIC_SLOTS", default = "false")]
    pub all_dynamic_slots: bool,

    /// Explicit allow-list of slot names.
    #[envconfig(from = "UNLOAD_VERIFIER_SLOTS", default = "")]
    pub slots: String,

    #[envconfig(from = "UNLOAD_VERIFIER_BASE_LAYER_ID", default = "platform.core")]
    pub base_layer_id: String,

    #[envconfig(from = "UNLOAD_VERIFIER_RUN_TIMEOUT_SECS", default = "300")]
    pub run_timeout_secs: u64,

    #[envconfig(from = "UNLOAD_VERIFIER_STEP_TIMEOUT_SECS", default = "60")]
    pub step_timeout_secs: u64,

    #[envconfig(from = "UNLOAD_VERIFIER_COLLECT_CYCLES", default = "2")]
    pub collect_cycles: u32,

    #[envconfig(from = "UNLOAD_VERIFIER_SETTLE_MS", default = "100")]
    pub settle_ms: u64,

    /// CI build configuration name appended to the run name.
    #[envconfig(from = "UNLOAD_VERIFIER_BUILD_CONF", default = "")]
    pub build_conf: String,

    #[envconfig(from = "UNLOAD_VERIFIER_SHUTDOWN_WAIT_SECS", default = "100")]
    pub shutdown_wait_secs: u64,

    #[envconfig(from = "UNLOAD_VERIFIER_ARTIFACT_DIR", default = "")]
    pub artifact_dir: String,

    #[envconfig(from = "UNLOAD_VERIFIER_LOG_LEVEL", default = "")]
    pub log_level: String,
}

impl HarnessConfig {
    /// Reads and validates configuration from process environment.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config = Self::init_from_env().map_err(|err| ConfigError::Env(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates configuration from an explicit variable map.
    pub fn load_from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let config =
            Self::init_from_hashmap(vars).map_err(|err| ConfigError::Env(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("UNLOAD_VERIFIER_RUN_TIMEOUT_SECS"));
        }
        if self.step_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("UNLOAD_VERIFIER_STEP_TIMEOUT_SECS"));
        }
        if self.shutdown_wait_secs == 0 {
            return Err(ConfigError::ZeroTimeout("UNLOAD_VERIFIER_SHUTDOWN_WAIT_SECS"));
        }
        PluginId::new(self.base_layer_id.as_str())
            .map_err(|_| ConfigError::EmptyBaseLayerId)?;
        for name in self.slot_allow_list() {
            Slot::dynamic(name.as_str())
                .validate()
                .map_err(|err| ConfigError::InvalidSlotName(err.to_string()))?;
        }
        Ok(())
    }

    /// Slot names listed in the explicit allow-list.
    pub fn slot_allow_list(&self) -> BTreeSet<String> {
        SLOT_LIST_SEPARATOR_RE
            .split(self.slots.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Policy selected by the override flag and allow-list.
    pub fn policy(&self) -> SlotPolicy {
        if self.all_dynamic_slots {
            SlotPolicy::All
        } else {
            SlotPolicy::Explicit(self.slot_allow_list())
        }
    }

    pub fn base_layer(&self) -> Result<PluginId, ConfigError> {
        PluginId::new(self.base_layer_id.as_str()).map_err(|_| ConfigError::EmptyBaseLayerId)
    }

    /// Run name, suffixed with `[build_conf]` when a build configuration is set.
    pub fn run_name(&self) -> String {
        let build_conf = self.build_conf.trim();
        if build_conf.is_empty() {
            DEFAULT_RUN_NAME.to_string()
        } else {
            format!("{DEFAULT_RUN_NAME}[{build_conf}]")
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_wait_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn collect_cycles(&self) -> u32 {
        self.collect_cycles.max(MIN_COLLECTION_CYCLES)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        let configured = self.artifact_dir.trim();
        if configured.is_empty() {
            std::env::temp_dir().join(ARTIFACT_DIR_NAME)
        } else {
            PathBuf::from(configured)
        }
    }

    /// Configured log level, or `None` to use the build-mode default.
    pub fn log_level(&self) -> Option<&str> {
        let level = self.log_level.trim();
        (!level.is_empty()).then_some(level)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Env(String),
    ZeroTimeout(&'static str),
    EmptyBaseLayerId,
    InvalidSlotName(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env(message) => write!(f, "invalid environment configuration: {message}"),
            Self::ZeroTimeout(variable) => write!(f, "{variable} must be greater than zero"),
            Self::EmptyBaseLayerId => {
                write!(f, "UNLOAD_VERIFIER_BASE_LAYER_ID must not be empty")
            }
            Self::InvalidSlotName(reason) => write!(f, "UNLOAD_VERIFIER_SLOTS: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HarnessConfig, DEFAULT_RUN_NAME};
    use crate::inventory::SlotPolicy;
    use std::collections::HashMap;
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_select_an_empty_explicit_policy() {
        let config = HarnessConfig::load_from_map(&HashMap::new()).expect("defaults load");
        assert_eq!(config.policy(), SlotPolicy::Explicit(Default::default()));
        assert!(!config.policy().is_applicable());
        assert_eq!(config.run_name(), DEFAULT_RUN_NAME);
        assert_eq!(config.run_timeout(), Duration::from_secs(300));
        assert_eq!(config.collect_cycles(), 2);
        assert_eq!(config.base_layer().expect("base layer").as_str(), "platform.core");
        assert!(config.log_level().is_none());
    }

    #[test]
    fn override_flag_selects_all_dynamic_slots() {
        let config = HarnessConfig::load_from_map(&vars(&[(
            "UNLOAD_VERIFIER_ALL_DYNAMIC_SLOTS",
            "true",
        )]))
        .expect("config");
        assert_eq!(config.policy(), SlotPolicy::All);
    }

    #[test]
    fn allow_list_splits_on_commas_semicolons_and_whitespace() {
        let config = HarnessConfig::load_from_map(&vars(&[(
            "UNLOAD_VERIFIER_SLOTS",
            " demo.fileType, demo.action;demo.listener\n demo.action ",
        )]))
        .expect("config");
        let names: Vec<String> = config.slot_allow_list().into_iter().collect();
        assert_eq!(names, vec!["demo.action", "demo.fileType", "demo.listener"]);
    }

    #[test]
    fn clamps_collection_cycles_and_suffixes_build_conf() {
        let config = HarnessConfig::load_from_map(&vars(&[
            ("UNLOAD_VERIFIER_COLLECT_CYCLES", "1"),
            ("UNLOAD_VERIFIER_BUILD_CONF", "Linux Tests"),
        ]))
        .expect("config");
        assert_eq!(config.collect_cycles(), 2);
        assert_eq!(config.run_name(), "testDynamicSlots[Linux Tests]");
    }

    #[test]
    fn rejects_zero_timeouts_and_malformed_numbers() {
        let err = HarnessConfig::load_from_map(&vars(&[("UNLOAD_VERIFIER_RUN_TIMEOUT_SECS", "0")]))
            .expect_err("zero timeout must fail");
        assert_eq!(
            err,
            ConfigError::ZeroTimeout("UNLOAD_VERIFIER_RUN_TIMEOUT_SECS")
        );

        let err = HarnessConfig::load_from_map(&vars(&[("UNLOAD_VERIFIER_SETTLE_MS", "soon")]))
            .expect_err("non-numeric value must fail");
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn rejects_blank_base_layer_id() {
        let err = HarnessConfig::load_from_map(&vars(&[("UNLOAD_VERIFIER_BASE_LAYER_ID", "  ")]))
            .expect_err("blank base layer must fail");
        assert_eq!(err, ConfigError::EmptyBaseLayerId);
    }

    #[test]
    fn rejects_allow_list_names_with_control_characters() {
        let err = HarnessConfig::load_from_map(&vars(&[(
            "UNLOAD_VERIFIER_SLOTS",
            "demo.fileType,demo\u{1}index",
        )]))
        .expect_err("control character must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidSlotName(ref reason) if reason.contains("control characters")
        ));

        HarnessConfig::load_from_map(&vars(&[("UNLOAD_VERIFIER_SLOTS", "it's|odd,[demo]")]))
            .expect("protocol symbols are valid slot names");
    }
}
