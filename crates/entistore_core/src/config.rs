//! Store configuration.

/// Default name prefix of listener worker threads.
pub const DEFAULT_LISTENER_THREAD_PREFIX: &str = "entistore-listener";

/// Configuration for an entity store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether secondary indices created by the store log a warning when
    /// asked to remove an entity they do not hold.
    pub strict_secondary_removal: bool,

    /// Name prefix of listener worker threads.
    pub listener_thread_prefix: String,

    /// Whether `restore` compares the rebuilt views against the snapshot.
    pub verify_views_after_restore: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict_secondary_removal: false,
            listener_thread_prefix: DEFAULT_LISTENER_THREAD_PREFIX.to_string(),
            verify_views_after_restore: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict secondary removal.
    #[must_use]
    pub const fn strict_secondary_removal(mut self, value: bool) -> Self {
        self.strict_secondary_removal = value;
        self
    }

    /// Sets the listener thread name prefix.
    #[must_use]
    pub fn listener_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.listener_thread_prefix = prefix.into();
        self
    }

    /// Sets whether restored views are verified.
    #[must_use]
    pub const fn verify_views_after_restore(mut self, value: bool) -> Self {
        self.verify_views_after_restore = value;
        self
    }
}
