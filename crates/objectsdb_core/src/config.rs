//! Session configuration.

/// Default number of entities kept resident in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Configuration for opening a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of resident entities before eviction starts.
    pub cache_capacity: usize,

    /// Whether to rebuild the key index from the objects already in the store.
    pub load_existing: bool,

    /// Whether to delete an existing store at the path before opening.
    pub overwrite: bool,

    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether every commit syncs the log to disk.
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            load_existing: true,
            overwrite: false,
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache capacity. Values below 1 are raised to 1.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Sets whether existing objects are indexed on open.
    #[must_use]
    pub const fn load_existing(mut self, value: bool) -> Self {
        self.load_existing = value;
        self
    }

    /// Sets whether an existing store is wiped on open.
    #[must_use]
    pub const fn overwrite(mut self, value: bool) -> Self {
        self.overwrite = value;
        self
    }

    /// Sets whether a missing store directory is created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether commits sync to disk.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    pub(crate) fn engine_config(&self) -> objectsdb_engine::EngineConfig {
        objectsdb_engine::EngineConfig {
            create_if_missing: self.create_if_missing,
            overwrite: self.overwrite,
            sync_on_commit: self.sync_on_commit,
        }
    }
}
