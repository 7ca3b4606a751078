//! The behavior pipeline.
//!
//! [`MessageProcessor`] runs the applicable behaviors around the handler of
//! a message:
//!
//! 1. `before` hooks in descending priority order (ties keep registration
//!    order). A behavior counts as entered once its `before` is called.
//! 2. The handler, if no `before` hook interrupted or faulted.
//! 3. `after` hooks of every entered behavior, in reverse order.
//!
//! The applicable behavior list is computed once per message type and
//! cached.
//!
//! # Example
//!
//! ```rust,ignore
//! let processor = MessageProcessor::new(Arc::new(handlers))
//!     .with_behavior(AuthenticationBehavior::new(auth).registration());
//!
//! let value = processor.process(DispatchContext::new(Arc::new(Ping))).await?;
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tower::Service;
use tracing::{Instrument, debug, debug_span};

use crate::behavior::{BehaviorRegistration, Flow};
use crate::handler::HandlerResolver;
use courier_core::{DispatchContext, DispatchError, DispatchResult, Message};

/// Runs behaviors and the resolved handler for one message at a time.
///
/// # Thread Safety
///
/// `MessageProcessor` is `Send + Sync`; concurrent calls share only the
/// immutable registrations and the plan cache.
pub struct MessageProcessor {
    resolver: Arc<dyn HandlerResolver>,
    /// Sorted by descending priority, stable.
    behaviors: Vec<BehaviorRegistration>,
    /// Indices into `behaviors` per message type.
    plans: RwLock<HashMap<TypeId, Arc<[usize]>>>,
}

impl MessageProcessor {
    /// Creates a processor without behaviors.
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            behaviors: Vec::new(),
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a behavior (builder pattern).
    pub fn with_behavior(mut self, registration: BehaviorRegistration) -> Self {
        self.behaviors.push(registration);
        self.sort_behaviors();
        self
    }

    /// Adds several behaviors, in registration order.
    pub fn with_behaviors(
        mut self,
        registrations: impl IntoIterator<Item = BehaviorRegistration>,
    ) -> Self {
        self.behaviors.extend(registrations);
        self.sort_behaviors();
        self
    }

    fn sort_behaviors(&mut self) {
        self.behaviors.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.plans.get_mut().clear();
    }

    /// Returns the registered behaviors in `before` order.
    pub fn behaviors(&self) -> &[BehaviorRegistration] {
        &self.behaviors
    }

    /// Returns the names of the behaviors that apply to `message`, in
    /// `before` order.
    pub fn applicable(&self, message: &dyn Message) -> Vec<&str> {
        self.plan(message)
            .iter()
            .map(|&index| self.behaviors[index].name())
            .collect()
    }

    fn plan(&self, message: &dyn Message) -> Arc<[usize]> {
        let type_id = message.message_type_id();
        if let Some(plan) = self.plans.read().get(&type_id).cloned() {
            return plan;
        }

        self.plans
            .write()
            .entry(type_id)
            .or_insert_with(|| {
                let kinds = message.kinds();
                self.behaviors
                    .iter()
                    .enumerate()
                    .filter(|(_, registration)| registration.applies_to.matches(type_id, kinds))
                    .map(|(index, _)| index)
                    .collect()
            })
            .clone()
    }

    /// Runs the pipeline for the message carried by `ctx`.
    ///
    /// Returns the handler result, the value of an interrupting behavior, or
    /// the fault raised by a behavior or the handler, as possibly replaced by
    /// `after` hooks.
    pub async fn process(&self, mut ctx: DispatchContext) -> DispatchResult<Value> {
        let message_name = ctx.message().message_name();
        let span = debug_span!("process", message = message_name);

        async move {
            let plan = self.plan(ctx.message().as_ref());
            let mut entered: Vec<&BehaviorRegistration> = Vec::with_capacity(plan.len());
            let mut short_circuit = None;

            for &index in plan.iter() {
                let registration = &self.behaviors[index];
                entered.push(registration);

                match registration.behavior.before(&mut ctx).await {
                    Flow::Proceed => {}
                    Flow::Interrupt(value) => {
                        debug!(behavior = registration.name(), "Behavior interrupted the pipeline");
                        short_circuit = Some(Ok(value));
                        break;
                    }
                    Flow::Fault(err) => {
                        debug!(behavior = registration.name(), error = %err, "Behavior faulted");
                        short_circuit = Some(Err(err));
                        break;
                    }
                }
            }

            let mut outcome = match short_circuit {
                Some(outcome) => outcome,
                None => self.invoke_handler(&ctx).await,
            };

            for registration in entered.iter().rev() {
                registration.behavior.after(&mut ctx, &mut outcome).await;
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn invoke_handler(&self, ctx: &DispatchContext) -> DispatchResult<Value> {
        ctx.check_cancelled()?;

        let message = ctx.message();
        let Some(handler) = self.resolver.resolve(message.message_type_id()) else {
            return Err(DispatchError::NoHandler {
                message: message.message_name(),
            });
        };

        debug!("Invoking handler");
        handler.handle_erased(ctx).await
    }

    /// Wraps this processor into a [`tower::Service`].
    pub fn into_service(self: Arc<Self>) -> ProcessorService {
        ProcessorService { processor: self }
    }
}

impl fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("behaviors", &self.behaviors)
            .finish()
    }
}

// ============================================================================
// ProcessorService
// ============================================================================

/// A tower [`Service`] over dispatch contexts.
///
/// Always ready; every call runs the full pipeline.
#[derive(Clone)]
pub struct ProcessorService {
    processor: Arc<MessageProcessor>,
}

impl Service<DispatchContext> for ProcessorService {
    type Response = Value;
    type Error = DispatchError;
    type Future = BoxFuture<'static, DispatchResult<Value>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: DispatchContext) -> Self::Future {
        let processor = Arc::clone(&self.processor);
        async move { processor.process(ctx).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::behavior::{Behavior, Priority};
    use crate::handler::{HandlerRegistry, handler_fn};

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    #[derive(Debug)]
    struct Invoice;

    impl Message for Invoice {
        fn kinds(&self) -> &'static [&'static str] {
            &["NonFree"]
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records its hooks and answers `before` with a fixed flow.
    struct Recorder {
        name: &'static str,
        log: Log,
        flow: Flow,
    }

    #[async_trait]
    impl Behavior for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn before(&self, _ctx: &mut DispatchContext) -> Flow {
            self.log.lock().push(format!("before:{}", self.name));
            self.flow.clone()
        }

        async fn after(&self, _ctx: &mut DispatchContext, _outcome: &mut DispatchResult<Value>) {
            self.log.lock().push(format!("after:{}", self.name));
        }
    }

    fn recorder(name: &'static str, priority: i32, log: &Log, flow: Flow) -> BehaviorRegistration {
        BehaviorRegistration::new(Recorder {
            name,
            log: Arc::clone(log),
            flow,
        })
        .with_priority(priority)
    }

    fn handlers(log: &Log, ran: &Arc<AtomicBool>) -> Arc<HandlerRegistry> {
        let log = Arc::clone(log);
        let ran = Arc::clone(ran);
        Arc::new(HandlerRegistry::new().with::<Ping, _>(handler_fn(move |_: Arc<Ping>| {
            let log = Arc::clone(&log);
            let ran = Arc::clone(&ran);
            async move {
                ran.store(true, Ordering::SeqCst);
                log.lock().push("handler".to_owned());
                Ok(Value::from("pong"))
            }
        })))
    }

    #[tokio::test]
    async fn test_no_behaviors_runs_handler() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;
        assert_eq!(result.unwrap(), Value::from("pong"));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_hooks_nest_by_priority() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran))
            .with_behavior(recorder("low", -5, &log, Flow::Proceed))
            .with_behavior(recorder("high", 10, &log, Flow::Proceed))
            .with_behavior(recorder("mid-a", 0, &log, Flow::Proceed))
            .with_behavior(recorder("mid-b", 0, &log, Flow::Proceed));

        processor
            .process(DispatchContext::new(Arc::new(Ping)))
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "before:high",
                "before:mid-a",
                "before:mid-b",
                "before:low",
                "handler",
                "after:low",
                "after:mid-b",
                "after:mid-a",
                "after:high",
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_skips_handler_and_unwinds_entered() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran))
            .with_behavior(recorder("outer", 10, &log, Flow::Proceed))
            .with_behavior(recorder("cache", 5, &log, Flow::Interrupt(Value::from(42))))
            .with_behavior(recorder("inner", 0, &log, Flow::Proceed));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;

        assert_eq!(result.unwrap(), Value::from(42));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(
            *log.lock(),
            vec!["before:outer", "before:cache", "after:cache", "after:outer"]
        );
    }

    #[tokio::test]
    async fn test_first_behavior_interrupt() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran))
            .with_behavior(recorder("only", 0, &log, Flow::Interrupt(Value::from(42))));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;

        assert_eq!(result.unwrap(), Value::from(42));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fault_propagates_through_entered() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran))
            .with_behavior(recorder("outer", 10, &log, Flow::Proceed))
            .with_behavior(recorder(
                "guard",
                5,
                &log,
                Flow::Fault(DispatchError::handler("denied")),
            ))
            .with_behavior(recorder("inner", 0, &log, Flow::Proceed));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;

        assert!(matches!(result, Err(DispatchError::Handler(reason)) if reason == "denied"));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(
            *log.lock(),
            vec!["before:outer", "before:guard", "after:guard", "after:outer"]
        );
    }

    struct Recover;

    #[async_trait]
    impl Behavior for Recover {
        async fn after(&self, _ctx: &mut DispatchContext, outcome: &mut DispatchResult<Value>) {
            if outcome.is_err() {
                *outcome = Ok(Value::from("recovered"));
            }
        }
    }

    #[tokio::test]
    async fn test_after_can_replace_fault() {
        let processor = MessageProcessor::new(Arc::new(HandlerRegistry::new()))
            .with_behavior(BehaviorRegistration::new(Recover));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;
        assert_eq!(result.unwrap(), Value::from("recovered"));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let processor = MessageProcessor::new(Arc::new(HandlerRegistry::new()));

        let result = processor.process(DispatchContext::new(Arc::new(Ping))).await;
        assert!(matches!(result, Err(DispatchError::NoHandler { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_handler() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let processor = MessageProcessor::new(handlers(&log, &ran));
        let token = CancellationToken::new();
        token.cancel();

        let ctx = DispatchContext::new(Arc::new(Ping)).with_cancellation(token);
        let result = processor.process(ctx).await;

        assert!(matches!(result, Err(DispatchError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_applicability_by_kind_and_type() {
        let log = Log::default();
        let processor = MessageProcessor::new(Arc::new(HandlerRegistry::new()))
            .with_behavior(recorder("all", 0, &log, Flow::Proceed))
            .with_behavior(recorder("non-free", 1, &log, Flow::Proceed).for_kind("NonFree"))
            .with_behavior(
                recorder("ping-only", Priority::HIGH.0, &log, Flow::Proceed).for_message::<Ping>(),
            );

        assert_eq!(processor.applicable(&Ping), vec!["ping-only", "all"]);
        assert_eq!(processor.applicable(&Invoice), vec!["non-free", "all"]);
        // Cached plans stay stable.
        assert_eq!(processor.applicable(&Invoice), vec!["non-free", "all"]);
    }

    #[tokio::test]
    async fn test_tower_service() {
        let log = Log::default();
        let ran = Arc::new(AtomicBool::new(false));
        let service = Arc::new(MessageProcessor::new(handlers(&log, &ran))).into_service();

        let value = service
            .oneshot(DispatchContext::new(Arc::new(Ping)))
            .await
            .unwrap();
        assert_eq!(value, Value::from("pong"));
    }
}
