use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::interaction::Responder;

/// Where a navigation is going and what it carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationContext {
    pub target: String,
    pub params: Map<String, Value>,
}

impl NavigationContext {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Typed parameter lookup. `None` if missing or of the wrong shape.
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Opt-in navigation callbacks for a view-model.
///
/// The navigation engine is external; it calls these hooks through the
/// [`ViewModelHost`](crate::view_model::ViewModelHost).
#[async_trait]
pub trait NavigationAware: Send + Sync {
    /// Whether this instance can serve `context`. Default: always.
    fn is_navigation_target(&self, _context: &NavigationContext) -> bool {
        true
    }

    /// Called after the view-model became the navigation target.
    async fn on_navigated_to(&self, _context: &NavigationContext) {}

    /// Called when navigating away from this view-model.
    async fn on_navigated_from(&self, _context: &NavigationContext) {}
}

/// Opt-in veto over navigating away.
#[async_trait]
pub trait ConfirmNavigation: Send + Sync {
    /// Answer through `responder` exactly once; `true` allows navigation.
    ///
    /// The responder may be answered after this returns, e.g. from an
    /// interaction request callback. A responder dropped unanswered denies
    /// the navigation.
    async fn confirm_navigation_request(&self, context: &NavigationContext, responder: Responder<bool>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_params() {
        let context = NavigationContext::new("details")
            .with_param("id", 42)
            .with_param("title", "hello");
        assert_eq!(context.param::<u64>("id"), Some(42));
        assert_eq!(context.param::<String>("title").as_deref(), Some("hello"));
        assert_eq!(context.param::<u64>("title"), None);
        assert_eq!(context.param::<u64>("missing"), None);
    }
}
