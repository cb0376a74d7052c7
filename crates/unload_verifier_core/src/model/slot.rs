//! Registration slot and plugin identity.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Plugin id of the immutable base layer unless configured otherwise.
pub const DEFAULT_BASE_LAYER_ID: &str = "platform.core";

/// Identifier of the plugin/module that declared a slot or owns an instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Builds a plugin id from a trimmed, non-empty value.
    pub fn new(value: impl Into<String>) -> Result<Self, SlotValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SlotValidationError::EmptyPluginId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Id of the immutable base layer with the default name.
    pub fn base_layer() -> Self {
        Self(DEFAULT_BASE_LAYER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PluginId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named extension point that holds zero or more component instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Unique slot name, e.g. `platform.fileType`.
    pub name: String,
    /// Whether instances can be unregistered without a restart.
    pub is_dynamic: bool,
    /// Declaring plugin; `None` for slots of the base layer.
    pub owner_plugin: Option<PluginId>,
}

impl Slot {
    pub fn new(name: impl Into<String>, is_dynamic: bool) -> Self {
        Self {
            name: name.into(),
            is_dynamic,
            owner_plugin: None,
        }
    }

    /// Slot whose instances may be removed at runtime.
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    /// Slot whose instances live until the host restarts.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    pub fn owned_by(mut self, plugin: PluginId) -> Self {
        self.owner_plugin = Some(plugin);
        self
    }

    /// Validates declaration-level slot invariants.
    pub fn validate(&self) -> Result<(), SlotValidationError> {
        if self.name.trim().is_empty() {
            return Err(SlotValidationError::EmptyName);
        }
        if self.name.trim() != self.name {
            return Err(SlotValidationError::UntrimmedName(self.name.clone()));
        }
        if self.name.chars().any(char::is_control) {
            let shown = self.name.escape_debug().to_string();
            return Err(SlotValidationError::ControlCharacter(shown));
        }
        Ok(())
    }
}

/// Slot declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValidationError {
    EmptyName,
    UntrimmedName(String),
    ControlCharacter(String),
    EmptyPluginId,
}

impl Display for SlotValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "slot name must not be empty"),
            Self::UntrimmedName(value) => {
                write!(f, "slot name must not carry surrounding whitespace: `{value}`")
            }
            Self::ControlCharacter(value) => {
                write!(f, "slot name must not contain control characters: `{value}`")
            }
            Self::EmptyPluginId => write!(f, "plugin id must not be empty"),
        }
    }
}

impl Error for SlotValidationError {}
