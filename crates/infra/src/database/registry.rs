//! Registry of logical databases.
//!
//! One [`DbManager`] per database name. The registry is an ordinary value:
//! callers share it by `Arc` and tests create as many isolated registries as
//! they like.

use std::collections::HashMap;
use std::sync::Arc;

use cipherstore_domain::{DatabaseConfig, Result};
use parking_lot::RwLock;
use tracing::{info, instrument};

use super::manager::DbManager;

/// Name-keyed registry of database managers
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    managers: RwLock<HashMap<String, Arc<DbManager>>>,
}

impl DatabaseRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` and return its manager.
    ///
    /// Registering the same `{name, password, version}` again returns the
    /// existing manager. A different identity under an existing name closes
    /// the old manager and replaces it.
    ///
    /// # Errors
    /// Returns `Config` when the configuration does not validate.
    #[instrument(skip(self, config), fields(db_name = %config.name))]
    pub fn register(&self, config: DatabaseConfig) -> Result<Arc<DbManager>> {
        if let Some(existing) = self.managers.read().get(&config.name) {
            if existing.config().same_identity(&config) {
                return Ok(Arc::clone(existing));
            }
        }

        let mut managers = self.managers.write();
        if let Some(existing) = managers.get(&config.name) {
            if existing.config().same_identity(&config) {
                return Ok(Arc::clone(existing));
            }
            existing.close_all();
            info!("Replacing database registration");
        }

        let name = config.name.clone();
        let manager = Arc::new(DbManager::new(config)?);
        managers.insert(name, Arc::clone(&manager));
        Ok(manager)
    }

    /// Manager registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<DbManager>> {
        self.managers.read().get(name).cloned()
    }

    /// Close and forget the manager registered under `name`.
    ///
    /// Returns whether a manager was registered.
    pub fn remove(&self, name: &str) -> bool {
        match self.managers.write().remove(name) {
            Some(manager) => {
                manager.close_all();
                true
            }
            None => false,
        }
    }

    /// Close every registered database, keeping the registrations.
    pub fn close_all(&self) {
        for manager in self.managers.read().values() {
            manager.close_all();
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Drop for DatabaseRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
