//! Runtime composition.
//!
//! [`CourierRuntime`] wires one application instance together: the
//! behavior pipeline with the built-in behaviors configured from
//! [`CourierConfig`], the validated router table, the broker, an optional
//! in-process hub attachment and the periodic sweeper.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("courier.toml")
//!     .handler::<Ping, _>(handler_fn(|_: Arc<Ping>| async { Ok(json!("pong")) }))
//!     .hub(hub.clone())
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ConfigLoader, CourierConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use courier_core::{DispatchResult, Endpoint, Envelope, Message};
use courier_framework::{
    AuthenticationBehavior, AuthenticationService, BehaviorRegistration, Broker, BrokerStats,
    FeatureRegistry, Handler, HandlerRegistry, MessageProcessor, RequiredFeatureBehavior,
    RouterRegistration, RouterTable, StaticFeatureRegistry, StaticTokenAuthenticator,
};
use courier_transport::{HubConnection, InProcessHub, InProcessRouter};

/// One running application instance.
pub struct CourierRuntime {
    config: CourierConfig,
    broker: Broker,
    processor: Arc<MessageProcessor>,
    /// Taken by the inbound pump on start.
    connection: Mutex<Option<HubConnection>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl CourierRuntime {
    /// Returns a builder that loads configuration from the default locations.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Returns this instance's endpoint, if configured.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.broker.config().endpoint.as_ref()
    }

    /// Returns the broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Returns the behavior pipeline.
    pub fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    /// Returns broker counters.
    pub fn stats(&self) -> BrokerStats {
        self.broker.stats()
    }

    /// Returns whether background tasks are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sends a one-way envelope.
    pub async fn send(&self, envelope: Envelope) {
        self.broker.send(envelope).await;
    }

    /// Sends a two-way envelope and waits for the reply.
    ///
    /// The call is cancelled when the runtime stops.
    pub async fn request(&self, envelope: Envelope) -> DispatchResult<Value> {
        let cancellation = self.shutdown.child_token();
        self.broker.send_and_receive(envelope, &cancellation).await
    }

    /// Starts the inbound pump and the sweeper.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Stopped`] if the runtime was already stopped.
    pub fn start(&self) -> RuntimeResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(RuntimeError::Stopped);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already running");
            return Ok(());
        }

        if let Some(connection) = self.connection.lock().take() {
            let tasks = self.tasks.clone();
            self.tasks.spawn(pump(
                connection,
                self.broker.clone(),
                tasks,
                self.shutdown.clone(),
            ));
        }

        self.tasks.spawn(sweep(
            self.broker.clone(),
            self.config.broker.sweep_interval(),
            self.shutdown.clone(),
        ));

        info!(endpoint = ?self.endpoint(), "Courier runtime started");
        Ok(())
    }

    /// Stops background tasks and waits for in-flight inbound envelopes.
    ///
    /// Outstanding [`request`](Self::request) calls complete as cancelled.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!("Runtime is not running");
            return;
        }

        info!("Stopping Courier runtime");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!(pending = self.broker.pending_count(), "Courier runtime stopped");
    }

    /// Runs until Ctrl+C (or SIGTERM on unix), then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        info!("Courier runtime is now running");
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}

impl std::fmt::Debug for CourierRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierRuntime")
            .field("broker", &self.broker)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Feeds envelopes from the hub into the broker, one task per envelope.
async fn pump(
    mut connection: HubConnection,
    broker: Broker,
    tasks: TaskTracker,
    shutdown: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            envelope = connection.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let broker = broker.clone();
        tasks.spawn(async move { broker.receive(envelope).await });
    }
    debug!(endpoint = %connection.endpoint(), "Inbound pump stopped");
}

async fn sweep(broker: Broker, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                broker.sweep_expired();
            }
        }
    }
    debug!("Sweeper stopped");
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => error!(error = %err, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`CourierRuntime`].
///
/// Configuration comes from a [`ConfigLoader`] searching the current
/// directory unless [`config`](Self::config) supplies it directly.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CourierConfig>,
    handlers: HandlerRegistry,
    behaviors: Vec<BehaviorRegistration>,
    routers: Vec<RouterRegistration>,
    hub: Option<InProcessHub>,
    features: Option<Arc<dyn FeatureRegistry>>,
    authentication: Option<Arc<dyn AuthenticationService>>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            handlers: HandlerRegistry::new(),
            behaviors: Vec::new(),
            routers: Vec::new(),
            hub: None,
            features: None,
            authentication: None,
            init_logging: true,
        }
    }

    /// Loads this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables `COURIER_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses this configuration instead of loading one. It is still validated.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Registers the handler for message type `M`.
    pub fn handler<M, H>(mut self, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.handlers.register::<M, H>(handler);
        self
    }

    /// Adds an application behavior.
    pub fn behavior(mut self, registration: BehaviorRegistration) -> Self {
        self.behaviors.push(registration);
        self
    }

    /// Adds a router.
    pub fn router(mut self, registration: RouterRegistration) -> Self {
        self.routers.push(registration);
        self
    }

    /// Attaches the instance to an in-process hub and routes `app://` urls
    /// through it. Requires `app.instance_id`.
    pub fn hub(mut self, hub: InProcessHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Replaces the feature registry built from `features.enabled`.
    pub fn feature_registry(mut self, registry: Arc<dyn FeatureRegistry>) -> Self {
        self.features = Some(registry);
        self
    }

    /// Installs authentication with this service instead of the configured
    /// tokens.
    pub fn authentication(mut self, service: Arc<dyn AuthenticationService>) -> Self {
        self.authentication = Some(service);
        self
    }

    /// Builds the runtime. Background tasks start with
    /// [`CourierRuntime::start`] or [`CourierRuntime::run`].
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if configuration is missing or invalid
    /// - [`RuntimeError::Framework`] if strict routing finds ambiguous routers
    /// - [`RuntimeError::Transport`] if the hub attachment fails
    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let endpoint = config.app.endpoint();

        let builtins = builtin_behaviors(&config, self.features, self.authentication);
        let processor = Arc::new(
            MessageProcessor::new(Arc::new(self.handlers))
                .with_behaviors(builtins)
                .with_behaviors(self.behaviors),
        );

        let mut routers = self.routers;
        if let Some(hub) = &self.hub {
            routers.push(InProcessRouter::new(hub.clone()).registration()?);
        }
        let table = RouterTable::new(routers);
        table.validate(config.routing.strict)?;

        let connection = match &self.hub {
            Some(hub) => {
                let endpoint = endpoint
                    .as_ref()
                    .filter(|e| e.app_instance_id.is_some())
                    .ok_or_else(|| ConfigError::missing_field("app.instance_id"))?;
                Some(hub.attach_with_capacity(endpoint, config.broker.inbox_capacity)?)
            }
            None => None,
        };

        let broker = Broker::builder()
            .routers(table)
            .processor(Arc::clone(&processor))
            .config(config.broker.to_broker_config(endpoint))
            .build();

        info!(
            routers = broker.routers().len(),
            behaviors = processor.behaviors().len(),
            strict_routing = config.routing.strict,
            "Runtime initialized from configuration"
        );

        Ok(CourierRuntime {
            config,
            broker,
            processor,
            connection: Mutex::new(connection),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }
}

/// The required-feature behavior always, authentication when enabled.
fn builtin_behaviors(
    config: &CourierConfig,
    features: Option<Arc<dyn FeatureRegistry>>,
    authentication: Option<Arc<dyn AuthenticationService>>,
) -> Vec<BehaviorRegistration> {
    let features = features
        .unwrap_or_else(|| Arc::new(StaticFeatureRegistry::new(config.features.enabled.clone())));
    let mut builtins = vec![RequiredFeatureBehavior::new(features).registration()];

    let authentication = authentication.or_else(|| {
        config.auth.enabled.then(|| {
            let service = config
                .auth
                .tokens
                .iter()
                .fold(StaticTokenAuthenticator::new(), |service, (token, entry)| {
                    service.with_token(token.clone(), entry.to_identity())
                });
            Arc::new(service) as Arc<dyn AuthenticationService>
        })
    });
    if let Some(service) = authentication {
        builtins.push(AuthenticationBehavior::new(service).registration());
    }

    builtins
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::DispatchContext;

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new().without_logging()
    }

    #[test]
    fn test_builtins_follow_config() {
        let mut config = CourierConfig::default();
        assert_eq!(builtin_behaviors(&config, None, None).len(), 1);

        config.auth.enabled = true;
        let names: Vec<_> = builtin_behaviors(&config, None, None)
            .iter()
            .map(|r| r.name().to_owned())
            .collect();
        assert_eq!(names, vec!["required-features", "authentication"]);
    }

    #[test]
    fn test_hub_requires_instance_id() {
        let result = builder()
            .config(CourierConfig::default())
            .hub(InProcessHub::new())
            .build();
        assert!(matches!(
            result,
            Err(RuntimeError::Config(ConfigError::MissingField { .. }))
        ));
    }

    #[test]
    fn test_strict_routing_rejects_duplicate_hub_router() {
        let hub = InProcessHub::new();
        let mut config = CourierConfig::default();
        config.app.instance_id = Some("w1".into());
        config.routing.strict = true;

        let result = builder()
            .config(config)
            .router(InProcessRouter::new(hub.clone()).registration().unwrap())
            .hub(hub.clone())
            .build();

        assert!(matches!(result, Err(RuntimeError::Framework(_))));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_auth_enabled_rejects_unknown_token() {
        let mut config = CourierConfig::default();
        config.auth.enabled = true;
        config.auth.tokens.insert(
            "secret".into(),
            crate::config::TokenConfig {
                subject: "alice".into(),
                roles: Vec::new(),
            },
        );

        let runtime = builder()
            .config(config)
            .handler::<Ping, _>(courier_framework::handler_fn(|_: Arc<Ping>| async {
                Ok(Value::from("pong"))
            }))
            .build()
            .unwrap();

        let ctx = DispatchContext::new(Arc::new(Ping)).with_bearer_token("wrong");
        assert!(runtime.processor().process(ctx).await.is_err());

        let ctx = DispatchContext::new(Arc::new(Ping)).with_bearer_token("secret");
        assert_eq!(
            runtime.processor().process(ctx).await.unwrap(),
            Value::from("pong")
        );
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut config = CourierConfig::default();
        config.app.instance_id = Some("w1".into());
        let hub = InProcessHub::new();

        let runtime = builder().config(config).hub(hub.clone()).build().unwrap();
        assert!(hub.is_attached("w1"));

        runtime.start().unwrap();
        assert!(runtime.is_running());
        runtime.stop().await;

        assert!(!runtime.is_running());
        assert!(!hub.is_attached("w1"));
        assert!(matches!(runtime.start(), Err(RuntimeError::Stopped)));
    }
}
