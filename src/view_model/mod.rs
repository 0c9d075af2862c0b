//! View-model contracts and the host that drives them.
//!
//! A view-model owns one [`LifecycleScope`] and declares which optional
//! collaborator contracts it supports through [`Capabilities`]. The
//! [`ViewModelHost`] calls initialization, navigation and destruction hooks
//! in the documented order.

mod host;
mod navigation;

pub use host::ViewModelHost;
pub use navigation::{ConfirmNavigation, NavigationAware, NavigationContext};

use async_trait::async_trait;
use serde_json::Value;

use crate::active::ActiveAwareness;
use crate::lifecycle::LifecycleScope;

/// One-time initialization after construction, before first use.
#[async_trait]
pub trait Initialize: Send + Sync {
    fn initialize(&self, _params: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Defaults to the synchronous [`initialize`](Self::initialize).
    async fn initialize_async(&self, params: &Value) -> anyhow::Result<()> {
        self.initialize(params)
    }
}

/// Optional contracts a view-model implements, declared up front.
#[derive(Default, Clone, Copy)]
pub struct Capabilities<'a> {
    pub navigation: Option<&'a dyn NavigationAware>,
    pub confirm_navigation: Option<&'a dyn ConfirmNavigation>,
    pub initialize: Option<&'a dyn Initialize>,
    pub active: Option<&'a ActiveAwareness>,
}

impl std::fmt::Debug for Capabilities<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("navigation", &self.navigation.is_some())
            .field("confirm_navigation", &self.confirm_navigation.is_some())
            .field("initialize", &self.initialize.is_some())
            .field("active", &self.active.is_some())
            .finish()
    }
}

/// The owning context of properties, commands and containers.
pub trait ViewModel: Send + Sync + 'static {
    fn scope(&self) -> &LifecycleScope;

    /// Read by the host on deactivate: `true` retains the instance instead
    /// of destroying it.
    fn keep_alive(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::default()
    }

    /// Runs before the scope is disposed.
    fn on_destroy(&self) {}
}
