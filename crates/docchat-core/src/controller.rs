//! Turn lifecycle: submitting, pausing, resuming, stopping, and settling exchanges

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::Snapshot,
    error::{Error, Result},
    events::ConversationEvent,
    handle::{ControllerHandle, Intent},
    session::{SessionId, SessionIdentity},
    transport::AnswerService,
    turn::{Turn, TurnStatus},
};

/// Shown when the service replies without an answer
pub const FALLBACK_ANSWER: &str = "No response received.";

/// Shown when a request fails
pub const FAILURE_MESSAGE: &str = "Error reaching the backend.";

/// Shown in place of a paused response
pub const PAUSE_NOTICE: &str = "Response was paused. Resume to continue or ask a new question.";

/// Opening assistant turn used unless configured otherwise
pub const DEFAULT_GREETING: &str = "Hello! Ask me anything based on the documents.";

/// Identifies one exchange; never reused within a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The service replied; `None` if the reply carried no answer
    Answered(Option<String>),
    /// The cancellation token fired before the reply arrived
    Cancelled,
    /// Network or service failure
    Failed(Failure),
}

/// Why a request failed, kept for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: String,
    /// HTTP status, if the service answered at all
    pub status: Option<u16>,
    /// Worth asking again by hand
    pub transient: bool,
}

impl From<&docchat_api::Error> for Failure {
    fn from(error: &docchat_api::Error) -> Self {
        Self {
            reason: error.to_string(),
            status: error.status_code(),
            transient: error.is_transient(),
        }
    }
}

/// A request's outcome, tagged with the exchange that issued it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub exchange: ExchangeId,
    pub outcome: Outcome,
}

/// Everything the run loop reacts to, in arrival order
#[derive(Debug)]
pub(crate) enum Inbound {
    Intent(Intent),
    Settled(Settlement),
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Assistant turn the conversation opens with; `None` starts empty
    pub greeting: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

/// The exchange currently waiting on the service
struct Exchange {
    id: ExchangeId,
    question: String,
    cancel: CancellationToken,
    /// Index of the pending placeholder; always the last turn
    placeholder: usize,
}

/// Owns the conversation and its single in-flight exchange.
///
/// Every state change happens on `&mut self`, either directly through the
/// intent methods or through [`TurnController::run`], which drains intents and
/// settlements from one queue. Requests run in spawned tasks that only report
/// back; they never touch the turns.
///
/// Methods that issue requests must be called inside a tokio runtime.
pub struct TurnController {
    session: Arc<SessionIdentity>,
    transport: Arc<dyn AnswerService>,
    turns: Vec<Turn>,
    in_flight: Option<Exchange>,
    next_exchange: u64,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    event_tx: broadcast::Sender<ConversationEvent>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl TurnController {
    /// Create a controller for a new conversation
    pub fn new(
        config: ControllerConfig,
        session: Arc<SessionIdentity>,
        transport: Arc<dyn AnswerService>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(256);

        let turns: Vec<Turn> = config
            .greeting
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .map(Turn::assistant)
            .into_iter()
            .collect();

        let (snapshot_tx, _) = watch::channel(Snapshot {
            session_id: session.id().clone(),
            turns: turns.clone(),
            in_flight: false,
            paused: false,
        });

        Self {
            session,
            transport,
            turns,
            in_flight: None,
            next_exchange: 0,
            inbound_tx,
            inbound_rx,
            event_tx,
            snapshot_tx,
        }
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for sending intents from other tasks
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            inbound: self.inbound_tx.clone(),
            events: self.event_tx.clone(),
            snapshot: self.snapshot_tx.subscribe(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Whether a request is outstanding
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The exchange currently waiting on the service
    pub fn current_exchange(&self) -> Option<ExchangeId> {
        self.in_flight.as_ref().map(|e| e.id)
    }

    /// The question the in-flight exchange is waiting on
    pub fn in_flight_question(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|e| e.question.as_str())
    }

    /// Whether the last response was paused and can be resumed
    pub fn is_paused(&self) -> bool {
        self.in_flight.is_none() && self.turns.last().is_some_and(Turn::is_cancelled)
    }

    /// Copy of the current state for rendering
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session.id().clone(),
            turns: self.turns.clone(),
            in_flight: self.in_flight.is_some(),
            paused: self.is_paused(),
        }
    }

    /// Ask a question.
    ///
    /// Appends the user turn and a pending placeholder, then issues exactly one
    /// request. Rejected without any change if `text` is blank or another
    /// exchange is in flight.
    pub fn submit(&mut self, text: &str) -> Result<ExchangeId> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.in_flight.is_some() {
            return Err(Error::ExchangeInFlight);
        }

        self.append(Turn::user(text));
        let id = self.start_exchange(text.to_string());
        self.publish();
        Ok(id)
    }

    /// Cancel the in-flight exchange, keeping its question replayable.
    ///
    /// The placeholder becomes a cancelled turn carrying [`PAUSE_NOTICE`].
    pub fn pause(&mut self) -> Result<()> {
        let exchange = self.in_flight.take().ok_or(Error::NothingInFlight)?;
        exchange.cancel.cancel();
        tracing::debug!(exchange = %exchange.id, "paused");

        self.resolve(exchange.placeholder, TurnStatus::Cancelled, PAUSE_NOTICE);
        self.publish();
        Ok(())
    }

    /// Replay a paused question as a new exchange.
    ///
    /// The cancelled turn is removed and the question before it is submitted
    /// again, so the transcript gains a fresh user turn and placeholder.
    pub fn resume(&mut self) -> Result<ExchangeId> {
        if !self.is_paused() {
            return Err(Error::NotPaused);
        }

        let index = self.turns.len() - 1;
        let question = match index.checked_sub(1).and_then(|i| self.turns.get(i)) {
            Some(turn) if turn.is_user() => turn.content().unwrap_or_default().to_string(),
            _ => return Err(Error::NotPaused),
        };

        self.turns.pop();
        self.emit(ConversationEvent::TurnRemoved { index });
        tracing::debug!(%question, "resuming");

        self.submit(&question)
    }

    /// Cancel and discard the pending or paused response.
    ///
    /// Safe to call at any time. Returns whether anything changed.
    pub fn stop(&mut self) -> bool {
        let mut changed = false;

        if let Some(exchange) = self.in_flight.take() {
            exchange.cancel.cancel();
            tracing::debug!(exchange = %exchange.id, "stopped");
            changed = true;
        }

        if self
            .turns
            .last()
            .is_some_and(|t| t.is_pending() || t.is_cancelled())
        {
            let index = self.turns.len() - 1;
            self.turns.pop();
            self.emit(ConversationEvent::TurnRemoved { index });
            changed = true;
        }

        if changed {
            self.publish();
        }
        changed
    }

    /// Reconcile a finished request.
    ///
    /// Applied only if `settlement` belongs to the in-flight exchange; anything
    /// else is stale and dropped. Returns whether the conversation changed.
    pub fn apply_settlement(&mut self, settlement: Settlement) -> bool {
        let exchange = match self.in_flight.take() {
            Some(exchange) if exchange.id == settlement.exchange => exchange,
            other => {
                self.in_flight = other;
                tracing::debug!(exchange = %settlement.exchange, "discarding stale settlement");
                self.emit(ConversationEvent::SettlementDiscarded {
                    exchange: settlement.exchange,
                });
                return false;
            }
        };

        let (status, content) = match settlement.outcome {
            Outcome::Answered(answer) => (
                TurnStatus::Completed,
                answer
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| FALLBACK_ANSWER.to_string()),
            ),
            Outcome::Cancelled => (TurnStatus::Cancelled, PAUSE_NOTICE.to_string()),
            Outcome::Failed(failure) => {
                tracing::warn!(
                    exchange = %exchange.id,
                    reason = %failure.reason,
                    status = ?failure.status,
                    transient = failure.transient,
                    "request failed"
                );
                (TurnStatus::Failed, FAILURE_MESSAGE.to_string())
            }
        };

        self.resolve(exchange.placeholder, status, content);
        self.publish();
        true
    }

    /// Apply an intent, logging rejections. Returns `false` on shutdown.
    pub fn apply_intent(&mut self, intent: Intent) -> bool {
        let result = match intent {
            Intent::Submit(text) => self.submit(&text).map(drop),
            Intent::Pause => self.pause(),
            Intent::Resume => self.resume().map(drop),
            Intent::Stop => {
                self.stop();
                Ok(())
            }
            Intent::Shutdown => {
                if let Some(exchange) = &self.in_flight {
                    exchange.cancel.cancel();
                }
                return false;
            }
        };

        match result {
            Err(e) if e.is_rejection() => tracing::debug!(error = %e, "intent rejected"),
            Err(e) => tracing::warn!(error = %e, "intent failed"),
            Ok(()) => {}
        }
        true
    }

    /// Wait for and handle the next intent or settlement.
    /// Returns `false` once a shutdown intent has been handled.
    pub async fn step(&mut self) -> bool {
        match self.inbound_rx.recv().await {
            Some(Inbound::Intent(intent)) => self.apply_intent(intent),
            Some(Inbound::Settled(settlement)) => {
                self.apply_settlement(settlement);
                true
            }
            None => false,
        }
    }

    /// Handle events until shutdown
    pub async fn run(mut self) {
        tracing::debug!(session_id = %self.session.id(), "conversation started");
        while self.step().await {}
        tracing::debug!("conversation closed");
    }

    // ---- Private helpers ----

    /// Append a placeholder, issue the request, and record the exchange.
    fn start_exchange(&mut self, question: String) -> ExchangeId {
        self.next_exchange += 1;
        let id = ExchangeId(self.next_exchange);

        let placeholder = self.append(Turn::placeholder());
        let cancel = CancellationToken::new();
        self.spawn_request(id, question.clone(), cancel.clone());

        self.emit(ConversationEvent::ExchangeStarted {
            exchange: id,
            question: question.clone(),
        });
        self.in_flight = Some(Exchange {
            id,
            question,
            cancel,
            placeholder,
        });
        id
    }

    /// Race the request against its token and post the outcome back.
    fn spawn_request(&self, exchange: ExchangeId, question: String, cancel: CancellationToken) {
        let transport = Arc::clone(&self.transport);
        let session_id = self.session.id().clone();
        let inbound = self.inbound_tx.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;

                _ = cancel.cancelled() => Outcome::Cancelled,

                result = transport.ask(&session_id, &question) => match result {
                    Ok(answer) => Outcome::Answered(answer),
                    Err(e) => Outcome::Failed(Failure::from(&e)),
                },
            };
            // The controller may be gone; nobody is left to tell.
            let _ = inbound.send(Inbound::Settled(Settlement { exchange, outcome }));
        });
    }

    fn append(&mut self, turn: Turn) -> usize {
        let index = self.turns.len();
        self.turns.push(turn.clone());
        self.emit(ConversationEvent::TurnAppended { index, turn });
        index
    }

    fn resolve(&mut self, index: usize, status: TurnStatus, content: impl Into<String>) {
        let Some(turn) = self.turns.get_mut(index) else {
            return;
        };
        if !turn.resolve(status, content) {
            return;
        }
        let turn = turn.clone();
        self.emit(ConversationEvent::TurnResolved { index, turn });
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Role;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// What the scripted service does with the next question
    enum Reply {
        Answer(Option<&'static str>),
        Fail(u16),
        /// Never settles on its own
        Hang,
        /// Settles when the test sends on the paired sender
        Gate(oneshot::Receiver<Option<String>>),
    }

    /// A transport that replays scripted replies and reports every call.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        calls: mpsc::UnboundedSender<(SessionId, String)>,
    }

    #[async_trait]
    impl AnswerService for ScriptedTransport {
        async fn ask(
            &self,
            session_id: &SessionId,
            question: &str,
        ) -> docchat_api::Result<Option<String>> {
            let _ = self.calls.send((session_id.clone(), question.to_string()));
            let reply = self.replies.lock().pop_front().unwrap_or(Reply::Hang);
            match reply {
                Reply::Answer(answer) => Ok(answer.map(str::to_string)),
                Reply::Fail(status) => Err(docchat_api::Error::status(status, "Internal Server Error")),
                Reply::Hang => std::future::pending().await,
                Reply::Gate(rx) => Ok(rx.await.unwrap_or_default()),
            }
        }
    }

    type Calls = mpsc::UnboundedReceiver<(SessionId, String)>;

    fn make_controller(replies: Vec<Reply>) -> (TurnController, Calls) {
        make_controller_with(ControllerConfig { greeting: None }, replies)
    }

    fn make_controller_with(config: ControllerConfig, replies: Vec<Reply>) -> (TurnController, Calls) {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(ScriptedTransport {
            replies: Mutex::new(replies.into()),
            calls: calls_tx,
        });
        let session = Arc::new(SessionIdentity::with_id("test-session"));
        (TurnController::new(config, session, transport), calls_rx)
    }

    async fn next_call(calls: &mut Calls) -> (SessionId, String) {
        tokio::time::timeout(Duration::from_secs(1), calls.recv())
            .await
            .expect("no request was issued")
            .expect("transport dropped")
    }

    /// Give spawned request tasks a chance to run, then check nothing else was asked.
    async fn assert_no_more_calls(calls: &mut Calls) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(calls.try_recv().is_err(), "unexpected extra request");
    }

    async fn step(controller: &mut TurnController) -> bool {
        tokio::time::timeout(Duration::from_secs(1), controller.step())
            .await
            .expect("no event arrived")
    }

    fn pending_count(controller: &TurnController) -> usize {
        controller.turns().iter().filter(|t| t.is_pending()).count()
    }

    // ===== submit =====

    #[tokio::test]
    async fn test_submit_appends_user_turn_and_placeholder() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang]);

        c.submit("What is the refund policy?").unwrap();

        assert_eq!(c.turns().len(), 2);
        assert_eq!(c.turns()[0].role(), Role::User);
        assert_eq!(c.turns()[0].content(), Some("What is the refund policy?"));
        assert!(c.turns()[1].is_pending());
        assert_eq!(c.turns()[1].content(), None);
        assert!(c.is_in_flight());
        assert_eq!(c.in_flight_question(), Some("What is the refund policy?"));

        let (session, question) = next_call(&mut calls).await;
        assert_eq!(session.as_str(), "test-session");
        assert_eq!(question, "What is the refund policy?");
    }

    #[tokio::test]
    async fn test_scenario_a_answer_completes_turn() {
        let (mut c, mut calls) = make_controller(vec![Reply::Answer(Some("30 days."))]);

        c.submit("What is the refund policy?").unwrap();
        next_call(&mut calls).await;
        assert!(step(&mut c).await);

        let last = c.turns().last().unwrap();
        assert_eq!(last.status(), Some(TurnStatus::Completed));
        assert_eq!(last.content(), Some("30 days."));
        assert!(!c.is_in_flight());
        assert!(!c.is_paused());
    }

    #[tokio::test]
    async fn test_missing_answer_uses_fallback() {
        let (mut c, _calls) = make_controller(vec![Reply::Answer(None), Reply::Answer(Some(""))]);

        c.submit("first").unwrap();
        step(&mut c).await;
        assert_eq!(c.turns()[1].status(), Some(TurnStatus::Completed));
        assert_eq!(c.turns()[1].content(), Some(FALLBACK_ANSWER));

        c.submit("second").unwrap();
        step(&mut c).await;
        assert_eq!(c.turns()[3].content(), Some(FALLBACK_ANSWER));
    }

    #[tokio::test]
    async fn test_scenario_d_failure_then_new_question() {
        let (mut c, _calls) = make_controller(vec![Reply::Fail(500), Reply::Answer(Some("Hi!"))]);

        c.submit("Hello").unwrap();
        step(&mut c).await;

        let failed = c.turns().last().unwrap();
        assert_eq!(failed.status(), Some(TurnStatus::Failed));
        assert_eq!(failed.content(), Some(FAILURE_MESSAGE));
        assert!(!c.is_in_flight());

        c.submit("Hi again").unwrap();
        step(&mut c).await;

        assert_eq!(c.turns().len(), 4);
        assert_eq!(c.turns()[1].status(), Some(TurnStatus::Failed));
        assert_eq!(c.turns()[3].status(), Some(TurnStatus::Completed));
        assert_eq!(c.turns()[3].content(), Some("Hi!"));
    }

    #[test]
    fn test_failure_keeps_status_and_transience() {
        let failure = Failure::from(&docchat_api::Error::status(503, "unavailable"));
        assert_eq!(failure.status, Some(503));
        assert!(failure.transient);
        assert_eq!(failure.reason, "Service returned 503: unavailable");

        let failure = Failure::from(&docchat_api::Error::status(400, "Question is required"));
        assert_eq!(failure.status, Some(400));
        assert!(!failure.transient);
    }

    #[tokio::test]
    async fn test_failed_settlement_marks_turn_failed() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang]);

        let id = c.submit("Hello").unwrap();
        let applied = c.apply_settlement(Settlement {
            exchange: id,
            outcome: Outcome::Failed(Failure {
                reason: "connection refused".into(),
                status: None,
                transient: true,
            }),
        });

        assert!(applied);
        assert_eq!(c.turns()[1].status(), Some(TurnStatus::Failed));
        assert_eq!(c.turns()[1].content(), Some(FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_scenario_e_blank_input_is_rejected() {
        let (mut c, mut calls) = make_controller(vec![]);

        assert!(matches!(c.submit(""), Err(Error::EmptyInput)));
        assert!(matches!(c.submit("   "), Err(Error::EmptyInput)));
        assert!(matches!(c.submit("\n\t"), Err(Error::EmptyInput)));

        assert!(c.turns().is_empty());
        assert!(!c.is_in_flight());
        assert_no_more_calls(&mut calls).await;
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang]);

        let first = c.submit("one").unwrap();
        assert!(matches!(c.submit("two"), Err(Error::ExchangeInFlight)));

        assert_eq!(c.turns().len(), 2);
        assert_eq!(c.current_exchange(), Some(first));
        assert_eq!(next_call(&mut calls).await.1, "one");
        assert_no_more_calls(&mut calls).await;
    }

    #[tokio::test]
    async fn test_submitted_text_is_kept_as_typed() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang]);

        c.submit("  padded question ").unwrap();

        assert_eq!(c.turns()[0].content(), Some("  padded question "));
        assert_eq!(next_call(&mut calls).await.1, "  padded question ");
    }

    // ===== pause / resume =====

    #[tokio::test]
    async fn test_scenario_b_pause_marks_placeholder_cancelled() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang]);

        c.submit("Explain clause 4").unwrap();
        next_call(&mut calls).await;
        c.pause().unwrap();

        let last = c.turns().last().unwrap();
        assert_eq!(last.status(), Some(TurnStatus::Cancelled));
        assert_eq!(last.content(), Some(PAUSE_NOTICE));
        assert_eq!(c.turns()[0].content(), Some("Explain clause 4"));
        assert!(!c.is_in_flight());
        assert!(c.is_paused());
    }

    #[tokio::test]
    async fn test_cancelled_settlement_after_pause_is_discarded() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang]);
        let mut events = c.subscribe();

        let id = c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        let before = c.turns().to_vec();

        // The request task notices the token and reports back.
        assert!(step(&mut c).await);
        assert_eq!(c.turns(), before.as_slice());

        let mut discarded = false;
        while let Ok(event) = events.try_recv() {
            if let ConversationEvent::SettlementDiscarded { exchange } = event {
                assert_eq!(exchange, id);
                discarded = true;
            }
        }
        assert!(discarded);
    }

    #[tokio::test]
    async fn test_scenario_c_resume_replays_question() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang, Reply::Hang]);

        let first = c.submit("Explain clause 4").unwrap();
        next_call(&mut calls).await;
        c.pause().unwrap();

        let second = c.resume().unwrap();
        assert_ne!(first, second);

        let (_, question) = next_call(&mut calls).await;
        assert_eq!(question, "Explain clause 4");

        assert_eq!(c.turns().len(), 3);
        assert!(c.turns()[0].is_user());
        assert!(c.turns()[1].is_user());
        assert_eq!(c.turns()[1].content(), Some("Explain clause 4"));
        assert!(c.turns()[2].is_pending());
        assert_eq!(pending_count(&c), 1);
        assert!(!c.turns().iter().any(Turn::is_cancelled));
        assert!(c.is_in_flight());
        assert!(!c.is_paused());
        assert_eq!(c.current_exchange(), Some(second));
    }

    #[tokio::test]
    async fn test_resumed_exchange_can_complete() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang, Reply::Answer(Some("Clause 4 covers refunds."))]);

        c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        c.resume().unwrap();

        // First the stale cancellation from the paused request, then the answer.
        step(&mut c).await;
        step(&mut c).await;

        assert_eq!(c.turns().len(), 3);
        assert_eq!(c.turns()[2].status(), Some(TurnStatus::Completed));
        assert_eq!(c.turns()[2].content(), Some("Clause 4 covers refunds."));
    }

    #[tokio::test]
    async fn test_late_reply_for_paused_exchange_is_ignored_after_resume() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (mut c, _calls) = make_controller(vec![Reply::Gate(gate_rx), Reply::Hang]);

        let first = c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        c.resume().unwrap();
        let _ = gate_tx.send(Some("stale answer".to_string()));

        let applied = c.apply_settlement(Settlement {
            exchange: first,
            outcome: Outcome::Answered(Some("stale answer".into())),
        });
        assert!(!applied);
        assert!(c.turns()[2].is_pending());
        assert!(c.is_in_flight());
    }

    #[tokio::test]
    async fn test_resume_submits_question_as_new_exchange() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang, Reply::Hang]);
        let mut events = c.subscribe();

        c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        while events.try_recv().is_ok() {}

        let id = c.resume().unwrap();

        let users: Vec<_> = c.turns().iter().filter(|t| t.is_user()).collect();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|t| t.content() == Some("Explain clause 4")));

        match events.try_recv().unwrap() {
            ConversationEvent::TurnRemoved { index } => assert_eq!(index, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConversationEvent::TurnAppended { index, turn } => {
                assert_eq!(index, 1);
                assert!(turn.is_user());
                assert_eq!(turn.content(), Some("Explain clause 4"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConversationEvent::TurnAppended { index, turn } => {
                assert_eq!(index, 2);
                assert!(turn.is_pending());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConversationEvent::ExchangeStarted { exchange, .. } => assert_eq!(exchange, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pause_without_exchange_is_rejected() {
        let (mut c, _calls) = make_controller(vec![]);
        assert!(matches!(c.pause(), Err(Error::NothingInFlight)));
        assert!(c.turns().is_empty());
    }

    #[tokio::test]
    async fn test_resume_without_pause_is_rejected() {
        let (mut c, mut calls) = make_controller(vec![Reply::Answer(Some("done")), Reply::Hang]);

        assert!(matches!(c.resume(), Err(Error::NotPaused)));

        c.submit("q").unwrap();
        assert!(matches!(c.resume(), Err(Error::NotPaused)));
        step(&mut c).await;
        assert!(matches!(c.resume(), Err(Error::NotPaused)));

        next_call(&mut calls).await;
        assert_no_more_calls(&mut calls).await;
    }

    #[tokio::test]
    async fn test_new_question_while_paused_keeps_cancelled_turn() {
        let (mut c, mut calls) = make_controller(vec![Reply::Hang, Reply::Hang]);

        c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        c.submit("Actually, explain clause 5").unwrap();

        assert_eq!(c.turns().len(), 4);
        assert_eq!(c.turns()[1].status(), Some(TurnStatus::Cancelled));
        assert!(c.turns()[3].is_pending());
        assert!(!c.is_paused());

        assert_eq!(next_call(&mut calls).await.1, "Explain clause 4");
        assert_eq!(next_call(&mut calls).await.1, "Actually, explain clause 5");
    }

    #[tokio::test]
    async fn test_cancelled_outcome_for_current_exchange_pauses() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang]);

        let id = c.submit("q").unwrap();
        let applied = c.apply_settlement(Settlement {
            exchange: id,
            outcome: Outcome::Cancelled,
        });

        assert!(applied);
        assert!(c.is_paused());
        assert_eq!(c.turns()[1].content(), Some(PAUSE_NOTICE));
    }

    // ===== stop =====

    #[tokio::test]
    async fn test_stop_discards_pending_placeholder() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang]);

        c.submit("Explain clause 4").unwrap();
        assert!(c.stop());

        assert_eq!(c.turns().len(), 1);
        assert!(c.turns()[0].is_user());
        assert!(!c.is_in_flight());
        assert!(!c.is_paused());
    }

    #[tokio::test]
    async fn test_stop_discards_paused_placeholder() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang]);

        c.submit("Explain clause 4").unwrap();
        c.pause().unwrap();
        assert!(c.stop());

        assert_eq!(c.turns().len(), 1);
        assert!(c.turns()[0].is_user());
        assert!(!c.is_paused());
        assert!(matches!(c.resume(), Err(Error::NotPaused)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_keeps_resolved_turns() {
        let (mut c, _calls) = make_controller(vec![Reply::Answer(Some("30 days."))]);

        assert!(!c.stop());

        c.submit("What is the refund policy?").unwrap();
        step(&mut c).await;
        assert!(!c.stop());
        assert!(!c.stop());

        assert_eq!(c.turns().len(), 2);
        assert_eq!(c.turns()[1].content(), Some("30 days."));
    }

    #[tokio::test]
    async fn test_reply_after_stop_does_not_alter_turns() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (mut c, mut calls) = make_controller(vec![Reply::Gate(gate_rx)]);

        let id = c.submit("Explain clause 4").unwrap();
        next_call(&mut calls).await;
        c.stop();
        let before = c.turns().to_vec();

        let _ = gate_tx.send(Some("too late".to_string()));
        assert!(step(&mut c).await);
        assert_eq!(c.turns(), before.as_slice());

        let applied = c.apply_settlement(Settlement {
            exchange: id,
            outcome: Outcome::Answered(Some("too late".into())),
        });
        assert!(!applied);
        assert_eq!(c.turns(), before.as_slice());
        assert!(!c.is_in_flight());
    }

    #[tokio::test]
    async fn test_submit_after_stop_starts_fresh_exchange() {
        let (mut c, _calls) = make_controller(vec![Reply::Hang, Reply::Answer(Some("ok"))]);

        c.submit("first").unwrap();
        c.stop();
        c.submit("second").unwrap();

        // Stale cancellation, then the answer.
        step(&mut c).await;
        step(&mut c).await;

        assert_eq!(c.turns().len(), 3);
        assert_eq!(c.turns()[0].content(), Some("first"));
        assert_eq!(c.turns()[1].content(), Some("second"));
        assert_eq!(c.turns()[2].content(), Some("ok"));
    }

    // ===== invariants, events, snapshots =====

    #[tokio::test]
    async fn test_in_flight_iff_trailing_pending_turn() {
        let (mut c, _calls) =
            make_controller(vec![Reply::Hang, Reply::Hang, Reply::Answer(Some("a")), Reply::Fail(502)]);

        let check = |c: &TurnController| {
            let trailing_pending = c.turns().last().is_some_and(Turn::is_pending);
            assert_eq!(c.is_in_flight(), trailing_pending);
            assert!(pending_count(c) <= 1);
        };

        check(&c);
        c.submit("1").unwrap();
        check(&c);
        c.pause().unwrap();
        check(&c);
        c.resume().unwrap();
        check(&c);
        c.stop();
        check(&c);
        c.submit("2").unwrap();
        check(&c);
        while c.is_in_flight() {
            step(&mut c).await;
            check(&c);
        }
        c.submit("3").unwrap();
        while c.is_in_flight() {
            step(&mut c).await;
            check(&c);
        }
    }

    #[tokio::test]
    async fn test_events_for_submit_and_resolution() {
        let (mut c, _calls) = make_controller(vec![Reply::Answer(Some("30 days."))]);
        let mut events = c.subscribe();

        let id = c.submit("What is the refund policy?").unwrap();
        step(&mut c).await;

        match events.try_recv().unwrap() {
            ConversationEvent::TurnAppended { index, turn } => {
                assert_eq!(index, 0);
                assert!(turn.is_user());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConversationEvent::TurnAppended { index, turn } => {
                assert_eq!(index, 1);
                assert!(turn.is_pending());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConversationEvent::ExchangeStarted { exchange, question } => {
                assert_eq!(exchange, id);
                assert_eq!(question, "What is the refund policy?");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        let resolved = events.try_recv().unwrap();
        assert_eq!(
            resolved.resolved_turn().and_then(Turn::content),
            Some("30 days.")
        );
    }

    #[tokio::test]
    async fn test_greeting_opens_conversation() {
        let (mut c, _calls) = make_controller_with(ControllerConfig::default(), vec![Reply::Hang]);

        assert_eq!(c.turns().len(), 1);
        assert_eq!(c.turns()[0].role(), Role::Assistant);
        assert_eq!(c.turns()[0].status(), Some(TurnStatus::Completed));
        assert_eq!(c.turns()[0].content(), Some(DEFAULT_GREETING));

        c.submit("q").unwrap();
        c.stop();
        assert_eq!(c.turns().len(), 2);
        assert_eq!(c.turns()[0].content(), Some(DEFAULT_GREETING));
    }

    #[tokio::test]
    async fn test_blank_greeting_starts_empty() {
        let config = ControllerConfig {
            greeting: Some("  ".into()),
        };
        let (c, _calls) = make_controller_with(config, vec![]);
        assert!(c.turns().is_empty());
    }

    #[tokio::test]
    async fn test_lazily_generated_session_id_is_sent() {
        let (calls_tx, mut calls) = mpsc::unbounded_channel();
        let transport = Arc::new(ScriptedTransport {
            replies: Mutex::new(VecDeque::from([Reply::Hang, Reply::Hang])),
            calls: calls_tx,
        });
        let mut c = TurnController::new(
            ControllerConfig { greeting: None },
            Arc::new(SessionIdentity::new()),
            transport,
        );

        c.submit("one").unwrap();
        c.stop();
        c.submit("two").unwrap();

        let (first, _) = next_call(&mut calls).await;
        let (second, _) = next_call(&mut calls).await;
        assert_eq!(&first, c.session_id());
        assert_eq!(first, second);
        assert_eq!(c.snapshot().session_id, first);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_controls() {
        use crate::conversation::Controls;

        let (mut c, _calls) = make_controller(vec![Reply::Hang]);
        let handle = c.handle();

        assert_eq!(handle.snapshot().controls(), Controls::Send);
        c.submit("q").unwrap();
        assert_eq!(handle.snapshot().controls(), Controls::PauseOrStop);
        c.pause().unwrap();
        assert_eq!(handle.snapshot().controls(), Controls::Resume);
        c.stop();
        assert_eq!(handle.snapshot().controls(), Controls::Send);
        assert_eq!(handle.snapshot().turns.len(), 1);
    }

    // ===== run loop =====

    #[tokio::test]
    async fn test_run_loop_processes_intents_from_handle() {
        let (c, _calls) = make_controller(vec![Reply::Answer(Some("30 days."))]);
        let handle = c.handle();
        let mut snapshots = handle.watch();
        let task = tokio::spawn(c.run());

        handle.submit("   ").unwrap();
        handle.submit("What is the refund policy?").unwrap();

        let done = tokio::time::timeout(
            Duration::from_secs(1),
            snapshots.wait_for(|s| {
                s.turns
                    .last()
                    .is_some_and(|t| t.status() == Some(TurnStatus::Completed))
            }),
        )
        .await
        .expect("exchange never completed")
        .expect("controller dropped")
        .clone();

        assert_eq!(done.turns.len(), 2);
        assert_eq!(done.turns[1].content(), Some("30 days."));

        handle.shutdown().unwrap();
        task.await.unwrap();
        assert!(matches!(handle.submit("after"), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_run_loop_pause_then_resume() {
        let (c, mut calls) = make_controller(vec![Reply::Hang, Reply::Hang]);
        let handle = c.handle();
        let mut snapshots = handle.watch();
        let task = tokio::spawn(c.run());

        handle.submit("Explain clause 4").unwrap();
        next_call(&mut calls).await;
        handle.pause().unwrap();
        tokio::time::timeout(Duration::from_secs(1), snapshots.wait_for(|s| s.paused))
            .await
            .unwrap()
            .unwrap();

        handle.resume().unwrap();
        assert_eq!(next_call(&mut calls).await.1, "Explain clause 4");

        let snapshot = tokio::time::timeout(
            Duration::from_secs(1),
            snapshots.wait_for(|s| s.in_flight),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.turns.len(), 3);
        assert!(snapshot.turns[1].is_user());
        assert!(snapshot.turns[2].is_pending());

        handle.shutdown().unwrap();
        task.await.unwrap();
    }
}
