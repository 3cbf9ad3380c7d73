//! Script migration registry
//!
//! Script migrations are compiled into the host binary. They are registered
//! by name and handed to the sync engine through a [`MigrationLoader`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::migration::{Direction, MigrationAction, MigrationEntry, MigrationScript};

/// Supplies the script migrations of a migration directory
pub trait MigrationLoader: Send + Sync {
    fn load(&self, directory: &Path) -> Result<Vec<(String, Arc<dyn MigrationScript>)>>;
}

/// In-process registry of named migration scripts
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: BTreeMap<String, Arc<dyn MigrationScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script under `name`, replacing any previous one
    pub fn register(mut self, name: impl Into<String>, script: impl MigrationScript + 'static) -> Self {
        self.scripts.insert(name.into(), Arc::new(script));
        self
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl MigrationLoader for ScriptRegistry {
    fn load(&self, _directory: &Path) -> Result<Vec<(String, Arc<dyn MigrationScript>)>> {
        Ok(self
            .scripts
            .iter()
            .map(|(name, script)| (name.clone(), Arc::clone(script)))
            .collect())
    }
}

/// Migrations backed by [`MigrationScript`] implementations
#[derive(Clone, Default)]
pub struct ScriptMigrationSource {
    scripts: BTreeMap<String, Arc<dyn MigrationScript>>,
}

impl ScriptMigrationSource {
    /// Populate the source from a loader
    pub fn from_loader(loader: &dyn MigrationLoader, directory: &Path) -> Result<Self> {
        let mut scripts = BTreeMap::new();
        for (name, script) in loader.load(directory)? {
            if scripts.insert(name.clone(), script).is_some() {
                return Err(Error::MigrationError(format!(
                    "Duplicate migration script: {}",
                    name
                )));
            }
        }
        Ok(Self { scripts })
    }

    /// Migration names, sorted
    pub fn keys(&self) -> Vec<String> {
        self.scripts.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<MigrationEntry> {
        let script = self
            .scripts
            .get(name)
            .ok_or_else(|| Error::MigrationNotFound(name.to_string()))?;

        Ok(MigrationEntry {
            name: name.to_string(),
            up: MigrationAction::Script {
                script: Arc::clone(script),
                direction: Direction::Up,
            },
            down: MigrationAction::Script {
                script: Arc::clone(script),
                direction: Direction::Down,
            },
        })
    }
}
