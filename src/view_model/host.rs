use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::LifecycleError;
use crate::interaction::Responder;
use crate::view_model::{NavigationContext, ViewModel};

#[derive(Debug, Default)]
struct HostState {
    initialized: bool,
    destroyed: bool,
}

/// Drives a view-model through initialization, navigation and destruction.
///
/// Stands in for the external shell: it calls the hooks the view-model
/// declared in its [`Capabilities`](crate::view_model::Capabilities), once
/// and in order.
pub struct ViewModelHost<V> {
    name: String,
    view_model: Arc<V>,
    state: Mutex<HostState>,
}

impl<V: ViewModel> ViewModelHost<V> {
    pub fn new(name: impl Into<String>, view_model: V) -> Self {
        Self {
            name: name.into(),
            view_model: Arc::new(view_model),
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view_model(&self) -> &Arc<V> {
        &self.view_model
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn ensure_alive(&self) -> Result<(), LifecycleError> {
        if self.is_destroyed() {
            return Err(LifecycleError::Destroyed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Run the view-model's initialization exactly once.
    pub async fn initialize(&self, params: &Value) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(LifecycleError::Destroyed {
                    name: self.name.clone(),
                });
            }
            if state.initialized {
                return Err(LifecycleError::AlreadyInitialized {
                    name: self.name.clone(),
                });
            }
            state.initialized = true;
        }

        let Some(initialize) = self.view_model.capabilities().initialize else {
            return Ok(());
        };
        initialize
            .initialize_async(params)
            .await
            .map_err(|error| LifecycleError::Initialization {
                name: self.name.clone(),
                message: format!("{error:#}"),
            })?;
        tracing::debug!(view_model = %self.name, "View-model initialized");
        Ok(())
    }

    /// Make the view-model the target of `context` and mark it active.
    pub async fn navigate_to(&self, context: &NavigationContext) -> Result<(), LifecycleError> {
        self.ensure_alive()?;
        let capabilities = self.view_model.capabilities();
        if let Some(navigation) = capabilities.navigation {
            if !navigation.is_navigation_target(context) {
                return Err(LifecycleError::NotNavigationTarget {
                    name: self.name.clone(),
                    target: context.target.clone(),
                });
            }
            navigation.on_navigated_to(context).await;
        }
        if let Some(active) = capabilities.active {
            active.set_active(true);
        }
        tracing::debug!(view_model = %self.name, target = %context.target, "Navigated to");
        Ok(())
    }

    /// Ask the view-model whether navigating away is allowed.
    ///
    /// View-models without the capability always allow it. An abandoned
    /// responder denies.
    pub async fn confirm_navigation(&self, context: &NavigationContext) -> Result<bool, LifecycleError> {
        self.ensure_alive()?;
        let Some(confirm) = self.view_model.capabilities().confirm_navigation else {
            return Ok(true);
        };
        let (responder, answer) = Responder::channel(format!("{}: confirm navigation", self.name));
        confirm.confirm_navigation_request(context, responder).await;
        match answer.await {
            Ok(allowed) => Ok(allowed),
            Err(_) => {
                tracing::warn!(view_model = %self.name, "Navigation confirmation abandoned; denying");
                Ok(false)
            }
        }
    }

    /// Navigate away: confirm, notify, deactivate, then destroy unless the
    /// view-model asks to be kept alive. Returns `false` if vetoed.
    pub async fn navigate_from(&self, context: &NavigationContext) -> Result<bool, LifecycleError> {
        if !self.confirm_navigation(context).await? {
            tracing::debug!(view_model = %self.name, target = %context.target, "Navigation vetoed");
            return Ok(false);
        }
        let capabilities = self.view_model.capabilities();
        if let Some(navigation) = capabilities.navigation {
            navigation.on_navigated_from(context).await;
        }
        if let Some(active) = capabilities.active {
            active.set_active(false);
        }
        if !self.view_model.keep_alive() {
            self.destroy();
        }
        Ok(true)
    }

    /// Call `on_destroy`, then dispose the scope. Idempotent; returns `true`
    /// for the call that destroyed.
    pub fn destroy(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return false;
            }
            state.destroyed = true;
        }
        self.view_model.on_destroy();
        self.view_model.scope().dispose();
        tracing::debug!(view_model = %self.name, "View-model destroyed");
        true
    }
}

impl<V> std::fmt::Debug for ViewModelHost<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModelHost")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish()
    }
}
