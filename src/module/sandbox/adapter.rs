//! Sandbox configuration and construction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::module::sandbox::scoped::ScopedSandboxEngine;
use crate::module::traits::{Sandbox, SandboxEngine, SandboxFactory};

/// Options handed to the default isolation engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxOptions {
    /// Give each sandbox its own global scope instead of writing through to the
    /// shared host scope and restoring it on teardown
    #[serde(default)]
    pub multi_mode: bool,
}

/// How a module should be isolated
#[derive(Clone, Default)]
pub enum SandboxConfig {
    /// No isolation
    #[default]
    Disabled,
    /// Default engine with these options
    Default(SandboxOptions),
    /// Caller-supplied constructor, invoked with no arguments
    Custom(Arc<dyn SandboxFactory>),
}

impl SandboxConfig {
    /// Default engine with default options
    pub fn enabled() -> Self {
        SandboxConfig::Default(SandboxOptions::default())
    }

    pub fn custom<F>(factory: F) -> Self
    where
        F: SandboxFactory + 'static,
    {
        SandboxConfig::Custom(Arc::new(factory))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, SandboxConfig::Disabled)
    }
}

impl From<bool> for SandboxConfig {
    fn from(enabled: bool) -> Self {
        if enabled {
            SandboxConfig::enabled()
        } else {
            SandboxConfig::Disabled
        }
    }
}

impl From<SandboxOptions> for SandboxConfig {
    fn from(options: SandboxOptions) -> Self {
        SandboxConfig::Default(options)
    }
}

impl fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxConfig::Disabled => f.write_str("Disabled"),
            SandboxConfig::Default(options) => f.debug_tuple("Default").field(options).finish(),
            SandboxConfig::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Builds sandboxes from [`SandboxConfig`]s using a default engine
#[derive(Clone)]
pub struct SandboxAdapter {
    engine: Arc<dyn SandboxEngine>,
}

impl SandboxAdapter {
    /// Adapter backed by the built-in scoped engine
    pub fn new() -> Self {
        Self::with_engine(Arc::new(ScopedSandboxEngine::new()))
    }

    /// Adapter backed by a different default engine
    pub fn with_engine(engine: Arc<dyn SandboxEngine>) -> Self {
        Self { engine }
    }

    /// Build a sandbox, or `None` when isolation is disabled
    pub fn create(&self, config: &SandboxConfig) -> Option<Arc<dyn Sandbox>> {
        match config {
            SandboxConfig::Disabled => None,
            SandboxConfig::Custom(factory) => {
                debug!("Constructing custom sandbox");
                Some(factory.construct())
            }
            SandboxConfig::Default(options) => {
                debug!("Constructing default sandbox: {:?}", options);
                Some(self.engine.create(options))
            }
        }
    }
}

impl Default for SandboxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoTeardown;
    impl Sandbox for NoTeardown {}

    #[test]
    fn test_disabled_builds_nothing() {
        let adapter = SandboxAdapter::new();
        assert!(adapter.create(&SandboxConfig::from(false)).is_none());
        assert!(adapter.create(&SandboxConfig::Disabled).is_none());
    }

    #[test]
    fn test_true_uses_default_options() {
        struct Recording(std::sync::Mutex<Vec<SandboxOptions>>);
        impl SandboxEngine for Recording {
            fn create(&self, options: &SandboxOptions) -> Arc<dyn Sandbox> {
                self.0.lock().unwrap().push(options.clone());
                Arc::new(NoTeardown)
            }
        }

        let engine = Arc::new(Recording(std::sync::Mutex::new(Vec::new())));
        let adapter = SandboxAdapter::with_engine(engine.clone());
        assert!(adapter.create(&SandboxConfig::from(true)).is_some());
        assert!(adapter
            .create(&SandboxConfig::from(SandboxOptions { multi_mode: true }))
            .is_some());

        let seen = engine.0.lock().unwrap();
        assert_eq!(seen[0], SandboxOptions::default());
        assert!(seen[1].multi_mode);
    }

    #[test]
    fn test_custom_factory_invoked() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let config = SandboxConfig::custom(|| -> Arc<dyn Sandbox> {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Arc::new(NoTeardown)
        });

        let sandbox = SandboxAdapter::new().create(&config).unwrap();
        // teardown without a clear capability is a no-op
        sandbox.clear();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }
}
