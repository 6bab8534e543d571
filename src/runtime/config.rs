/// Environment variable naming the pool in logs.
pub const POOL_NAME_ENV: &str = "RUST_WORKFLOW_POOL_NAME";
/// Environment variable overriding the fallback log filter.
pub const LOG_FILTER_ENV: &str = "RUST_WORKFLOW_LOG";

/// Settings for a [`WorkflowPool`](super::WorkflowPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Recorded on every instance span, to tell pools in one process apart.
    pub name: String,
    /// Install a default `tracing` subscriber when the pool is created. Off by default; a
    /// host process normally installs its own.
    pub install_subscriber: bool,
    /// Filter used by that subscriber when `RUST_LOG` is unset.
    pub default_log_filter: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            install_subscriber: false,
            default_log_filter: "info".to_string(),
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `RUST_WORKFLOW_POOL_NAME` and `RUST_WORKFLOW_LOG` when set.
    /// Setting `RUST_WORKFLOW_LOG` also turns on the default subscriber.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(name) = std::env::var(POOL_NAME_ENV)
            && !name.trim().is_empty()
        {
            cfg.name = name;
        }
        if let Ok(filter) = std::env::var(LOG_FILTER_ENV)
            && !filter.trim().is_empty()
        {
            cfg.default_log_filter = filter;
            cfg.install_subscriber = true;
        }
        cfg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_subscriber(mut self, install: bool) -> Self {
        self.install_subscriber = install;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_log_filter = filter.into();
        self
    }
}
