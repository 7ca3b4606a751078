//! Required-feature enforcement.
//!
//! Message types may declare application features they depend on through
//! [`Message::required_features`]. [`RequiredFeatureBehavior`] faults calls
//! whose message needs a feature the [`FeatureRegistry`] reports disabled,
//! before the handler is reached.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{Behavior, BehaviorRegistration, Flow, Priority};
use courier_core::{DispatchContext, DispatchError, Message};

/// Reports which application features are enabled.
pub trait FeatureRegistry: Send + Sync + 'static {
    /// Returns `true` if the named feature is enabled.
    fn is_feature_enabled(&self, feature: &str) -> bool;
}

// ============================================================================
// RequiredFeatureBehavior
// ============================================================================

/// Faults calls whose message requires a disabled feature.
///
/// The required features of each message type are read once and cached.
pub struct RequiredFeatureBehavior {
    registry: Arc<dyn FeatureRegistry>,
    required: RwLock<HashMap<TypeId, &'static [&'static str]>>,
}

impl RequiredFeatureBehavior {
    /// Creates the behavior.
    pub fn new(registry: Arc<dyn FeatureRegistry>) -> Self {
        Self {
            registry,
            required: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the registration for every message at [`Priority::HIGH`].
    pub fn registration(self) -> BehaviorRegistration {
        BehaviorRegistration::new(self).with_priority(Priority::HIGH)
    }

    fn required_for(&self, message: &dyn Message) -> &'static [&'static str] {
        let type_id = message.message_type_id();
        if let Some(features) = self.required.read().get(&type_id).copied() {
            return features;
        }

        *self
            .required
            .write()
            .entry(type_id)
            .or_insert_with(|| message.required_features())
    }
}

#[async_trait]
impl Behavior for RequiredFeatureBehavior {
    fn name(&self) -> &str {
        "required-features"
    }

    async fn before(&self, ctx: &mut DispatchContext) -> Flow {
        let message = ctx.message().as_ref();
        let required = self.required_for(message);

        match required
            .iter()
            .find(|feature| !self.registry.is_feature_enabled(feature))
        {
            Some(feature) => {
                debug!(
                    message = message.message_name(),
                    feature, "Required feature is disabled"
                );
                Flow::Fault(DispatchError::FeatureUnavailable {
                    feature: (*feature).to_owned(),
                    message: message.message_name(),
                })
            }
            None => Flow::Proceed,
        }
    }
}

// ============================================================================
// StaticFeatureRegistry
// ============================================================================

/// A [`FeatureRegistry`] with a fixed set of enabled features.
#[derive(Debug, Default, Clone)]
pub struct StaticFeatureRegistry {
    enabled: HashSet<String>,
}

impl StaticFeatureRegistry {
    /// Creates a registry with the given features enabled.
    pub fn new<I, S>(enabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Enables a feature (builder pattern).
    pub fn enable(mut self, feature: impl Into<String>) -> Self {
        self.enabled.insert(feature.into());
        self
    }
}

impl FeatureRegistry for StaticFeatureRegistry {
    fn is_feature_enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }
}
