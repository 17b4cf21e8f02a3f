//! Ring and engine configuration.

use crate::layout::LayoutRevision;
use crate::{RingError, RingResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a hardware engine participating in a unit of work.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EngineId(pub u8);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine{}", self.0)
    }
}

fn enabled_by_default() -> bool {
    true
}

/// One engine of the engine set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: EngineId,
    pub name: String,
    #[serde(default)]
    pub layout: LayoutRevision,
    /// Disabled engines get no status region and take no part in evaluation.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl EngineConfig {
    pub fn new(id: u8, name: impl Into<String>, layout: LayoutRevision) -> Self {
        Self {
            id: EngineId(id),
            name: name.into(),
            layout,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Shape of a status ring: capacity plus the engine set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Prefix for region debug names.
    pub name: String,
    /// Number of report slots; fixed for the ring's lifetime.
    pub capacity: u32,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

impl RingConfig {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            engines: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn enabled_engines(&self) -> impl Iterator<Item = &EngineConfig> {
        self.engines.iter().filter(|engine| engine.enabled)
    }

    pub fn validate(&self) -> RingResult<()> {
        if self.name.is_empty() {
            return Err(RingError::NullConfiguration("ring name"));
        }
        if self.capacity == 0 {
            return Err(RingError::invalid_config("capacity must be at least 1"));
        }
        if self.enabled_engines().next().is_none() {
            return Err(RingError::NullConfiguration("enabled engine set"));
        }

        let mut seen = HashSet::new();
        for engine in &self.engines {
            if engine.name.is_empty() {
                return Err(RingError::NullConfiguration("engine name"));
            }
            if !seen.insert(engine.id) {
                return Err(RingError::invalid_config(format!(
                    "{} listed more than once",
                    engine.id
                )));
            }
        }
        Ok(())
    }
}
