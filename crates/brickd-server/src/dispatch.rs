//! Action dispatch.
//!
//! Inbound frames resolve to a registered [`ActionHandler`]. Synchronous
//! handlers run inline on the connection's reader task and must be fast;
//! asynchronous handlers are queued to a single worker that executes them
//! one at a time in submission order, so `runScript` and `stopScript`
//! never interleave.
//!
//! Handler errors never tear down a connection: they become `Exception` /
//! `ScriptException` frames pushed to the outbox, addressed to the caller
//! alone or to everyone depending on the error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use brickd_core::{ActionMessage, BrickError, OutboundEnvelope, SessionId, protocol};
use brickd_runtime::ScriptManager;

use crate::outbox::Outbox;

/// Control over the host the daemon runs on.
pub trait SystemControl: Send + Sync {
    /// Power off the underlying board.
    fn halt_system(&self);
}

/// [`SystemControl`] backed by the host's `shutdown` command.
pub struct HostSystem;

impl SystemControl for HostSystem {
    fn halt_system(&self) {
        info!("powering off the host");
        run_halt_command("shutdown");
    }
}

/// Run the power-off command to completion, so the child is reaped instead
/// of lingering as a zombie until the daemon exits.
fn run_halt_command(program: &str) {
    match std::process::Command::new(program).args(["-h", "now"]).status() {
        Ok(status) if !status.success() => {
            warn!(%status, "host shutdown command failed");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to invoke host shutdown"),
    }
}

/// Everything a handler may touch.
pub struct DispatchContext {
    pub outbox: Arc<Outbox>,
    pub scripts: Arc<ScriptManager>,
    pub system: Arc<dyn SystemControl>,
    /// Cancelling this token shuts the whole daemon down.
    pub shutdown: CancellationToken,
}

/// One named action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Wire name clients put in the `act` field.
    fn name(&self) -> &str;

    /// Whether this action runs on the FIFO worker instead of inline.
    fn is_async(&self) -> bool;

    async fn process(
        &self,
        msg: ActionMessage,
        session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError>;
}

struct Job {
    handler: Arc<dyn ActionHandler>,
    msg: ActionMessage,
    session: SessionId,
}

/// Name-keyed handler table plus the async worker feeding channel.
pub struct ActionDispatcher {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    ctx: Arc<DispatchContext>,
    worker_tx: mpsc::UnboundedSender<Job>,
}

impl ActionDispatcher {
    /// Build the dispatcher and spawn its worker task. The worker exits
    /// when the context's shutdown token fires.
    pub fn new(ctx: Arc<DispatchContext>) -> Arc<Self> {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let worker_ctx = Arc::clone(&ctx);
        tokio::spawn(worker_loop(worker_rx, worker_ctx));
        Arc::new(Self { handlers: RwLock::new(HashMap::new()), ctx, worker_tx })
    }

    /// Register a handler under its wire name. Last registration wins.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) {
        let name = handler.name().to_string();
        if self.handlers.write().insert(name.clone(), handler).is_some() {
            warn!(action = %name, "replacing previously registered action handler");
        }
    }

    /// Process one raw inbound frame from a session.
    ///
    /// Every failure — unparsable frame, unknown action, handler error —
    /// ends up as an outbound frame, never as a connection error.
    pub async fn dispatch(&self, session: SessionId, raw: &str) {
        if let Err(e) = self.dispatch_inner(session, raw).await {
            report_error(&self.ctx.outbox, session, &e);
        }
    }

    async fn dispatch_inner(&self, session: SessionId, raw: &str) -> Result<(), BrickError> {
        let msg = ActionMessage::parse(raw)?;
        let handler = self
            .handlers
            .read()
            .get(msg.action())
            .cloned()
            .ok_or_else(|| BrickError::UnknownAction { action: msg.action().to_string() })?;

        if handler.is_async() {
            self.worker_tx
                .send(Job { handler, msg, session })
                .map_err(|_| BrickError::UnexpectedError {
                    detail: "action worker is not running".into(),
                })?;
            return Ok(());
        }

        let action = msg.action().to_string();
        let started = Instant::now();
        let result = handler.process(msg, session, &self.ctx).await;
        debug!(action = %action, elapsed_us = started.elapsed().as_micros() as u64, "sync action processed");
        result
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<Job>, ctx: Arc<DispatchContext>) {
    loop {
        let job = tokio::select! {
            () = ctx.shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let action = job.msg.action().to_string();
        debug!(action = %action, "async action starting");
        if let Err(e) = job.handler.process(job.msg, job.session, &ctx).await {
            report_error(&ctx.outbox, job.session, &e);
        }
        debug!(action = %action, "async action finished");
    }
}

/// Turn a handler error into its outbound frame.
fn report_error(outbox: &Outbox, session: SessionId, err: &BrickError) {
    warn!(session = %session, error = %err, "action failed");
    let frame = protocol::exception_frame(err);
    let envelope = if err.notify_only_caller() {
        OutboundEnvelope::unicast(session, frame)
    } else {
        OutboundEnvelope::broadcast(frame)
    };
    outbox.push(envelope);
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickd_runtime::{InterpreterRegistry, NullHardware};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullSystem;
    impl SystemControl for NullSystem {
        fn halt_system(&self) {}
    }

    fn context() -> Arc<DispatchContext> {
        let outbox = Arc::new(Outbox::new());
        let scripts = Arc::new(ScriptManager::new(
            InterpreterRegistry::with_defaults(),
            Arc::new(NullHardware),
            Arc::clone(&outbox) as Arc<dyn brickd_runtime::EventSink>,
        ));
        Arc::new(DispatchContext {
            outbox,
            scripts,
            system: Arc::new(NullSystem),
            shutdown: CancellationToken::new(),
        })
    }

    struct Recorder {
        is_async: bool,
        calls: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn new(is_async: bool) -> Self {
            Self {
                is_async,
                calls: Arc::new(Mutex::new(Vec::new())),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        fn name(&self) -> &str {
            "record"
        }
        fn is_async(&self) -> bool {
            self.is_async
        }
        async fn process(
            &self,
            msg: ActionMessage,
            _session: SessionId,
            _ctx: &DispatchContext,
        ) -> Result<(), BrickError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.calls.lock().push(msg.field_str("tag").unwrap_or("?").to_string());
            let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn drain_codes(outbox: &Outbox) -> Vec<String> {
        outbox
            .drain()
            .iter()
            .filter_map(|e| {
                let frame: Value = serde_json::from_str(&e.payload).ok()?;
                frame["code"].as_str().map(ToString::to_string)
            })
            .collect()
    }

    #[test]
    fn halt_command_is_reaped_and_failures_are_non_fatal() {
        // `true` ignores the arguments; waiting on its status reaps it.
        run_halt_command("true");
        // A missing program is logged, never propagated.
        run_halt_command("definitely-not-a-real-command");
    }

    #[tokio::test]
    async fn unknown_action_yields_exception_frame() {
        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        dispatcher.dispatch(SessionId::new(), r#"{"act":"bogusAction"}"#).await;
        assert_eq!(drain_codes(&ctx.outbox), vec!["UNKNOWN_ACTION"]);
    }

    #[tokio::test]
    async fn malformed_frame_yields_exception_frame() {
        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        let session = SessionId::new();
        dispatcher.dispatch(session, "not json at all").await;

        let events = ctx.outbox.drain();
        assert_eq!(events.len(), 1);
        // Protocol errors go to the offending caller only.
        assert_eq!(events[0].target, Some(session));
        let frame: Value = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(frame["msgTyp"], "Exception");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bursts_keep_per_producer_fifo_order() {
        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        let recorder = Arc::new(Recorder::new(true));
        let calls = Arc::clone(&recorder.calls);
        dispatcher.register(recorder);

        // Several sessions submit concurrently; each tags its frames with a
        // producer id and a sequence number.
        let producers = 4;
        let per_producer = 10;
        let mut tasks = Vec::new();
        for p in 0..producers {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                let session = SessionId::new();
                for i in 0..per_producer {
                    dispatcher
                        .dispatch(session, &format!(r#"{{"act":"record","tag":"{p}-{i}"}}"#))
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let total = producers * per_producer;
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.lock().len() < total {
            assert!(Instant::now() < deadline, "worker did not finish in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Cross-producer interleaving is arbitrary; within each producer the
        // worker must preserve submission order.
        let recorded = calls.lock().clone();
        for p in 0..producers {
            let prefix = p.to_string();
            let seen: Vec<usize> = recorded
                .iter()
                .filter_map(|tag| {
                    let (producer, seq) = tag.split_once('-')?;
                    (producer == prefix).then(|| seq.parse().unwrap())
                })
                .collect();
            let expected: Vec<usize> = (0..per_producer).collect();
            assert_eq!(seen, expected, "producer {p} saw reordered frames");
        }
    }

    #[tokio::test]
    async fn async_actions_never_overlap() {
        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        let recorder = Arc::new(Recorder::new(true));
        let calls = Arc::clone(&recorder.calls);
        let max_in_flight = Arc::clone(&recorder.max_in_flight);
        dispatcher.register(recorder);

        let session = SessionId::new();
        for i in 0..10 {
            dispatcher
                .dispatch(session, &format!(r#"{{"act":"record","tag":"{i}"}}"#))
                .await;
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.lock().len() < 10 {
            assert!(Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_handler_runs_inline() {
        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        let recorder = Arc::new(Recorder::new(false));
        let calls = Arc::clone(&recorder.calls);
        dispatcher.register(recorder);

        dispatcher.dispatch(SessionId::new(), r#"{"act":"record","tag":"x"}"#).await;
        // Inline execution: done before dispatch returns.
        assert_eq!(*calls.lock(), vec!["x"]);
    }

    #[tokio::test]
    async fn handler_error_is_reported_not_fatal() {
        struct Failing;
        #[async_trait]
        impl ActionHandler for Failing {
            fn name(&self) -> &str {
                "fail"
            }
            fn is_async(&self) -> bool {
                false
            }
            async fn process(
                &self,
                _msg: ActionMessage,
                _session: SessionId,
                _ctx: &DispatchContext,
            ) -> Result<(), BrickError> {
                Err(BrickError::FieldNotFound { field: "sText".into() })
            }
        }

        let ctx = context();
        let dispatcher = ActionDispatcher::new(Arc::clone(&ctx));
        dispatcher.register(Arc::new(Failing));
        let session = SessionId::new();
        dispatcher.dispatch(session, r#"{"act":"fail"}"#).await;

        let events = ctx.outbox.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, Some(session));
        let frame: Value = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(frame["code"], "MESSAGE_FIELD_NOT_FOUND");

        // The same dispatcher keeps serving afterwards.
        dispatcher.dispatch(session, r#"{"act":"fail"}"#).await;
        assert_eq!(ctx.outbox.len(), 1);
    }
}
