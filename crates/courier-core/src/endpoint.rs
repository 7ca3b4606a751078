//! Logical message recipients.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Url used to route envelopes that carry no recipients at all.
pub const BROADCAST_URL: &str = "app://*/*";

/// Identifies a logical sender or recipient of an envelope.
///
/// At least one of `app_id`, `app_instance_id` or `url` should be set. When
/// no explicit url is present, routing uses an implicit url of the form
/// `app://{app_id}/{app_instance_id}` with `*` standing in for unset parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical application identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Identifier of a running application instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_instance_id: Option<String>,
    /// Explicit transport url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint addressing every instance of an application.
    pub fn app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Default::default()
        }
    }

    /// Creates an endpoint addressing a single application instance.
    pub fn instance(app_instance_id: impl Into<String>) -> Self {
        Self {
            app_instance_id: Some(app_instance_id.into()),
            ..Default::default()
        }
    }

    /// Creates an endpoint with an explicit url.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sets the application identifier.
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Sets the application instance identifier.
    pub fn with_app_instance_id(mut self, app_instance_id: impl Into<String>) -> Self {
        self.app_instance_id = Some(app_instance_id.into());
        self
    }

    /// Sets the explicit url.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.app_id.is_none() && self.app_instance_id.is_none() && self.url.is_none()
    }

    /// Returns the url that router patterns are matched against.
    pub fn routing_url(&self) -> Cow<'_, str> {
        match &self.url {
            Some(url) => Cow::Borrowed(url),
            None => Cow::Owned(format!(
                "app://{}/{}",
                self.app_id.as_deref().unwrap_or("*"),
                self.app_instance_id.as_deref().unwrap_or("*")
            )),
        }
    }

    /// Returns `true` if every field set on `self` has the same value on `other`.
    ///
    /// An empty endpoint matches everything.
    pub fn matches(&self, other: &Endpoint) -> bool {
        fn field_matches(expected: &Option<String>, actual: &Option<String>) -> bool {
            match expected {
                Some(value) => actual.as_deref() == Some(value.as_str()),
                None => true,
            }
        }

        field_matches(&self.app_id, &other.app_id)
            && field_matches(&self.app_instance_id, &other.app_instance_id)
            && field_matches(&self.url, &other.url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.routing_url())
    }
}
