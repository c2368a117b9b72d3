//! ConversationManager — owns every conversation and serializes access to each.
//!
//! Each conversation sits behind its own mutex. The lock is held only while
//! reading or mutating state, never across the inference or itinerary call.
//! A generation counter, bumped on reset and on correction, lets late results
//! dispatched against an older state be recognized and dropped.
//!
//! Conversations idle longer than `idle_timeout` are pruned, and the registry
//! holds at most `max_conversations`; starting one more evicts the least
//! recently active conversation that is not in use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::inference::{
    InferenceBackend, InferenceClient, InferenceRequest, ModelInference, ModelInferenceConfig,
    RestInference,
};
use super::itinerary::{HttpItineraryService, ItineraryDocument, ItineraryService};
use super::normalize::SlotRejection;
use super::request::ItineraryRequest;
use super::schema::SlotField;
use super::slots::TripSlots;
use super::state::{ConversationState, Phase, Turn, sanitize_suggestions};
use crate::config::{InferenceBackendKind, PlannerConfig};
use crate::error::{ChatError, ConfigError, InferenceError, ItineraryError, TrackerError};
use crate::llm::create_provider;

/// Manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on one inference call.
    pub inference_timeout: Duration,
    /// Upper bound on one itinerary generation call.
    pub itinerary_timeout: Duration,
    /// Conversations untouched for this long are pruned.
    pub idle_timeout: Duration,
    /// Registry capacity.
    pub max_conversations: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            inference_timeout: Duration::from_secs(30),
            itinerary_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(3600), // 1 hour
            max_conversations: 10_000,
        }
    }
}

/// One conversation plus its bookkeeping.
#[derive(Debug)]
struct Session {
    state: ConversationState,
    generation: u64,
    itinerary: Option<ItineraryDocument>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            state: ConversationState::new(),
            generation: 0,
            itinerary: None,
            last_active: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

type Registry = HashMap<Uuid, Arc<Mutex<Session>>>;

/// What the user sees after a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    pub reply: String,
    pub suggestions: Vec<String>,
    pub variables: TripSlots,
    pub next_field: Option<SlotField>,
    pub done: bool,
    pub rejected: Vec<SlotRejection>,
}

/// Result of handling a user message.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Applied(TurnOutcome),
    /// The conversation was reset or corrected while inference was in flight.
    StaleResultDiscarded { conversation_id: Uuid },
}

/// Read-only view of a conversation for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub conversation_id: Uuid,
    pub phase: Phase,
    pub done: bool,
    pub variables: TripSlots,
    pub next_field: Option<SlotField>,
    pub history: Vec<Turn>,
    pub itinerary_request: Option<ItineraryRequest>,
}

impl ConversationView {
    fn new(conversation_id: Uuid, state: &ConversationState) -> Self {
        Self {
            conversation_id,
            phase: state.phase(),
            done: state.done(),
            variables: state.slots().clone(),
            next_field: state.next_missing_field(),
            history: state.history().to_vec(),
            itinerary_request: state.itinerary_request().cloned(),
        }
    }
}

/// Coordinates conversations, inference, and itinerary generation.
pub struct ConversationManager {
    inference: Arc<dyn InferenceClient>,
    itinerary: Arc<dyn ItineraryService>,
    sessions: RwLock<Registry>,
    config: ManagerConfig,
}

impl ConversationManager {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        itinerary: Arc<dyn ItineraryService>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            inference,
            itinerary,
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Build the configured inference backend and itinerary client.
    pub fn from_config(config: &PlannerConfig) -> crate::error::Result<Self> {
        let backend = match config.backend {
            InferenceBackendKind::Rest => InferenceBackend::Rest(RestInference::new(
                &config.chat_api_base,
                config.inference_timeout,
            )?),
            InferenceBackendKind::Model => {
                let llm_config = config
                    .llm
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;
                let llm = create_provider(llm_config)?;
                InferenceBackend::Model(ModelInference::new(llm, ModelInferenceConfig::default()))
            }
        };
        let itinerary =
            HttpItineraryService::new(&config.itinerary_api_base, config.itinerary_timeout)?;

        Ok(Self::new(
            Arc::new(backend),
            Arc::new(itinerary),
            config.manager_config(),
        ))
    }

    /// Name of the inference backend in use.
    pub fn backend_name(&self) -> &str {
        self.inference.name()
    }

    /// Number of live conversations.
    pub async fn conversation_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start an empty conversation and return its id.
    ///
    /// Prunes idle conversations first and, at capacity, evicts the least
    /// recently active one.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        prune_idle(&mut sessions, self.config.idle_timeout);
        while sessions.len() >= self.config.max_conversations.max(1) {
            if !evict_least_recent(&mut sessions) {
                warn!(
                    live = sessions.len(),
                    "Every conversation is busy, exceeding capacity"
                );
                break;
            }
        }
        sessions.insert(id, Arc::new(Mutex::new(Session::new())));
        info!(conversation_id = %id, "Conversation started");
        id
    }

    /// Drop conversations idle longer than the configured timeout.
    pub async fn prune_stale_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let pruned = prune_idle(&mut sessions, self.config.idle_timeout);
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle conversations");
        }
        pruned
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, TrackerError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TrackerError::ConversationNotFound(id))
    }

    /// Current public state of a conversation.
    pub async fn view(&self, id: Uuid) -> Result<ConversationView, TrackerError> {
        let session = self.session(id).await?;
        let mut guard = session.lock().await;
        guard.touch();
        Ok(ConversationView::new(id, &guard.state))
    }

    /// Handle one user message. `None` starts a new conversation.
    ///
    /// The user turn is recorded together with the inference result, so a
    /// failed or timed-out call leaves the conversation exactly as it was.
    pub async fn handle_message(
        &self,
        id: Option<Uuid>,
        message: &str,
        today: NaiveDate,
    ) -> Result<ChatOutcome, ChatError> {
        let id = match id {
            Some(id) => id,
            None => self.create().await,
        };
        let session = self.session(id).await?;

        let (request, generation) = {
            let mut guard = session.lock().await;
            guard.touch();
            if guard.state.done() {
                // Complete conversations take no further slot updates.
                guard.state.record_user_message(message);
                let reply = guard.state.compose_reply("", &[]);
                guard.state.record_assistant_message(&reply);
                return Ok(ChatOutcome::Applied(outcome(id, &guard.state, reply, &[], Vec::new())));
            }
            let request = InferenceRequest {
                schema_field_values: guard.state.slots().clone(),
                last_assistant_message: guard
                    .state
                    .last_assistant_message()
                    .unwrap_or_default()
                    .to_string(),
                user_message: message.to_string(),
                today,
            };
            (request, guard.generation)
        };

        let backend = self.inference.name().to_string();
        let response = match tokio::time::timeout(
            self.config.inference_timeout,
            self.inference.infer(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(conversation_id = %id, backend = %backend, error = %e, "Inference failed");
                return Err(ChatError::Inference {
                    conversation_id: id,
                    source: e,
                });
            }
            Err(_) => {
                warn!(conversation_id = %id, backend = %backend, "Inference timed out");
                return Err(ChatError::Inference {
                    conversation_id: id,
                    source: InferenceError::Timeout {
                        backend,
                        timeout: self.config.inference_timeout,
                    },
                });
            }
        };

        let mut guard = session.lock().await;
        guard.touch();
        if guard.generation != generation {
            info!(
                conversation_id = %id,
                dispatched = generation,
                current = guard.generation,
                "Discarding inference result dispatched against an older state"
            );
            return Ok(ChatOutcome::StaleResultDiscarded {
                conversation_id: id,
            });
        }

        let Session { state, .. } = &mut *guard;
        state.record_user_message(message);
        let applied = state.apply_inferred_update(&response.variables, response.done, today);
        let reply = state.compose_reply(&response.reply, &applied.rejected);
        state.record_assistant_message(&reply);
        let suggestions = sanitize_suggestions(&response.suggestions, applied.done);

        info!(
            conversation_id = %id,
            accepted = applied.accepted.len(),
            rejected = applied.rejected.len(),
            filled = state.slots().filled_count(),
            done = applied.done,
            "Turn applied"
        );

        Ok(ChatOutcome::Applied(outcome(
            id,
            state,
            reply,
            &applied.rejected,
            suggestions,
        )))
    }

    /// Explicit user-directed correction of one slot.
    ///
    /// Any inference still in flight was built from the old values and is
    /// discarded when it returns.
    pub async fn correct_slot(
        &self,
        id: Uuid,
        field: SlotField,
        value: Option<&str>,
        today: NaiveDate,
    ) -> Result<ConversationView, TrackerError> {
        let session = self.session(id).await?;
        let mut guard = session.lock().await;
        guard.touch();
        guard.state.correct_slot(field, value, today)?;
        guard.generation += 1;
        info!(conversation_id = %id, field = %field, cleared = value.is_none(), "Slot corrected");
        Ok(ConversationView::new(id, &guard.state))
    }

    /// Discard slots and history.
    pub async fn reset(&self, id: Uuid) -> Result<ConversationView, TrackerError> {
        let session = self.session(id).await?;
        let mut guard = session.lock().await;
        guard.touch();
        guard.state.reset();
        guard.itinerary = None;
        guard.generation += 1;
        info!(conversation_id = %id, generation = guard.generation, "Conversation reset");
        Ok(ConversationView::new(id, &guard.state))
    }

    /// Generate (once) the itinerary for a complete conversation.
    ///
    /// The snapshot taken at completion is what gets sent. A successful
    /// document is cached until the next reset.
    pub async fn generate_itinerary(
        &self,
        id: Uuid,
    ) -> Result<ItineraryDocument, ItineraryError> {
        let session = self.session(id).await?;

        let (request, generation) = {
            let mut guard = session.lock().await;
            guard.touch();
            if let Some(doc) = &guard.itinerary {
                debug!(conversation_id = %id, "Serving cached itinerary");
                return Ok(doc.clone());
            }
            let request = match guard.state.itinerary_request() {
                Some(request) => request.clone(),
                None => ItineraryRequest::build(guard.state.slots())?,
            };
            (request, guard.generation)
        };

        let document = match tokio::time::timeout(
            self.config.itinerary_timeout,
            self.itinerary.generate(&request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ItineraryError::Timeout(self.config.itinerary_timeout)),
        };

        let mut guard = session.lock().await;
        if guard.generation == generation {
            guard.itinerary = Some(document.clone());
            info!(conversation_id = %id, destination = %request.destination, "Itinerary generated");
        } else {
            info!(conversation_id = %id, "Conversation reset during itinerary generation, not caching");
        }
        Ok(document)
    }
}

/// Remove idle sessions. A session whose lock is held is in use and stays.
fn prune_idle(sessions: &mut Registry, idle_timeout: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| match session.try_lock() {
        Ok(guard) => guard.last_active.elapsed() < idle_timeout,
        Err(_) => true,
    });
    before - sessions.len()
}

/// Remove the least recently active session not in use. False if all are busy.
fn evict_least_recent(sessions: &mut Registry) -> bool {
    let oldest = sessions
        .iter()
        .filter_map(|(id, session)| session.try_lock().ok().map(|g| (*id, g.last_active)))
        .min_by_key(|(_, last_active)| *last_active)
        .map(|(id, _)| id);
    match oldest {
        Some(id) => {
            sessions.remove(&id);
            debug!(conversation_id = %id, "Evicted least recently active conversation");
            true
        }
        None => false,
    }
}

fn outcome(
    id: Uuid,
    state: &ConversationState,
    reply: String,
    rejected: &[SlotRejection],
    suggestions: Vec<String>,
) -> TurnOutcome {
    TurnOutcome {
        conversation_id: id,
        reply,
        suggestions,
        variables: state.slots().clone(),
        next_field: state.next_missing_field(),
        done: state.done(),
        rejected: rejected.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::inference::InferenceResponse;
    use crate::trip::normalize::ProposedSlots;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    /// Replays scripted responses in order.
    struct ScriptedInference {
        script: std::sync::Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
    }

    impl ScriptedInference {
        fn new(script: Vec<Result<InferenceResponse, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedInference {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn infer(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(InferenceResponse::default()))
        }
    }

    /// Blocks until released, then proposes a destination.
    struct GatedInference {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl InferenceClient for GatedInference {
        fn name(&self) -> &str {
            "gated"
        }

        async fn infer(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(InferenceResponse {
                reply: "late".into(),
                variables: ProposedSlots::new().with("destination", "Paris"),
                ..Default::default()
            })
        }
    }

    struct SlowInference;

    #[async_trait]
    impl InferenceClient for SlowInference {
        fn name(&self) -> &str {
            "slow"
        }

        async fn infer(&self, _request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(InferenceResponse::default())
        }
    }

    struct CountingItinerary {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ItineraryService for CountingItinerary {
        async fn generate(&self, request: &ItineraryRequest) -> Result<ItineraryDocument, ItineraryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ItineraryDocument(serde_json::json!({
                "destination": request.destination,
                "days": [],
            })))
        }
    }

    fn itinerary() -> Arc<CountingItinerary> {
        Arc::new(CountingItinerary {
            calls: AtomicUsize::new(0),
        })
    }

    fn propose(pairs: &[(&str, &str)], done: bool) -> Result<InferenceResponse, InferenceError> {
        let mut variables = ProposedSlots::new();
        for (k, v) in pairs {
            variables = variables.with(k, *v);
        }
        Ok(InferenceResponse {
            reply: "Noted.".into(),
            suggestions: vec!["a".into(), "b".into()],
            variables,
            done,
        })
    }

    fn full_script() -> Vec<Result<InferenceResponse, InferenceError>> {
        vec![
            propose(&[("destination", "Paris"), ("departure_city", "London")], false),
            propose(
                &[
                    ("start_date", "2025-03-10"),
                    ("num_days", "5"),
                    ("budget", "Medium"),
                    ("trip_type", "Romantic"),
                ],
                false,
            ),
        ]
    }

    fn manager(inference: Arc<dyn InferenceClient>, itinerary: Arc<dyn ItineraryService>) -> ConversationManager {
        ConversationManager::new(
            inference,
            itinerary,
            ManagerConfig {
                inference_timeout: Duration::from_millis(200),
                itinerary_timeout: Duration::from_secs(1),
                ..ManagerConfig::default()
            },
        )
    }

    fn applied(outcome: ChatOutcome) -> TurnOutcome {
        match outcome {
            ChatOutcome::Applied(turn) => turn,
            ChatOutcome::StaleResultDiscarded { .. } => panic!("unexpected stale result"),
        }
    }

    #[tokio::test]
    async fn full_conversation_completes_and_generates_once() {
        let counting = itinerary();
        let mgr = manager(ScriptedInference::new(full_script()), counting.clone());
        let id = mgr.create().await;

        let first = applied(mgr.handle_message(Some(id), "Paris from London", today()).await.unwrap());
        assert_eq!(first.next_field, Some(SlotField::StartDate));
        assert!(!first.done);
        assert_eq!(first.suggestions, vec!["a", "b"]);

        let second = applied(mgr.handle_message(Some(id), "the rest", today()).await.unwrap());
        assert!(second.done);
        assert!(second.suggestions.is_empty());
        assert!(second.reply.contains("All details collected"));

        let doc = mgr.generate_itinerary(id).await.unwrap();
        assert_eq!(doc.0["destination"], "Paris");
        mgr.generate_itinerary(id).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        let view = mgr.view(id).await.unwrap();
        assert_eq!(view.history.len(), 4);
        assert_eq!(view.phase, Phase::Complete);
    }

    #[tokio::test]
    async fn inference_failure_leaves_state_unchanged() {
        let script = vec![Err(InferenceError::Unavailable {
            backend: "scripted".into(),
            reason: "down".into(),
        })];
        let mgr = manager(ScriptedInference::new(script), itinerary());
        let id = mgr.create().await;

        let err = mgr.handle_message(Some(id), "hello", today()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Inference {
                source: InferenceError::Unavailable { .. },
                ..
            }
        ));

        let view = mgr.view(id).await.unwrap();
        assert!(view.history.is_empty());
        assert_eq!(view.variables, TripSlots::default());
    }

    #[tokio::test]
    async fn inference_timeout_is_reported() {
        let mgr = manager(Arc::new(SlowInference), itinerary());
        let id = mgr.create().await;
        let err = mgr.handle_message(Some(id), "hello", today()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Inference {
                source: InferenceError::Timeout { .. },
                ..
            }
        ));
        assert!(mgr.view(id).await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn result_after_reset_is_discarded() {
        let gated = Arc::new(GatedInference {
            started: Notify::new(),
            release: Notify::new(),
        });
        let mgr = Arc::new(ConversationManager::new(
            gated.clone(),
            itinerary(),
            ManagerConfig::default(),
        ));
        let id = mgr.create().await;

        let task = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.handle_message(Some(id), "Paris", today()).await })
        };

        gated.started.notified().await;
        mgr.reset(id).await.unwrap();
        gated.release.notify_one();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, ChatOutcome::StaleResultDiscarded { conversation_id } if conversation_id == id));

        let view = mgr.view(id).await.unwrap();
        assert_eq!(view.variables, TripSlots::default());
        assert!(view.history.is_empty());
    }

    #[tokio::test]
    async fn generate_before_complete_is_rejected() {
        let mgr = manager(ScriptedInference::new(vec![]), itinerary());
        let id = mgr.create().await;
        let err = mgr.generate_itinerary(id).await.unwrap_err();
        assert!(matches!(
            err,
            ItineraryError::Tracker(TrackerError::IncompleteSlots { .. })
        ));
    }

    #[tokio::test]
    async fn reset_twice_matches_reset_once() {
        let mgr = manager(ScriptedInference::new(full_script()), itinerary());
        let id = mgr.create().await;
        mgr.handle_message(Some(id), "Paris", today()).await.unwrap();

        let once = mgr.reset(id).await.unwrap();
        let twice = mgr.reset(id).await.unwrap();
        assert_eq!(once.variables, twice.variables);
        assert_eq!(once.history, twice.history);
        assert!(!twice.done);
    }

    #[tokio::test]
    async fn reset_clears_cached_itinerary() {
        let counting = itinerary();
        let mut script = full_script();
        script.extend(full_script());
        let mgr = manager(ScriptedInference::new(script), counting.clone());
        let id = mgr.create().await;

        mgr.handle_message(Some(id), "one", today()).await.unwrap();
        mgr.handle_message(Some(id), "two", today()).await.unwrap();
        mgr.generate_itinerary(id).await.unwrap();

        mgr.reset(id).await.unwrap();
        assert!(mgr.generate_itinerary(id).await.is_err());

        mgr.handle_message(Some(id), "one", today()).await.unwrap();
        mgr.handle_message(Some(id), "two", today()).await.unwrap();
        mgr.generate_itinerary(id).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn complete_conversation_skips_inference() {
        let mut script = full_script();
        script.push(propose(&[("destination", "Berlin")], false));
        let mgr = manager(ScriptedInference::new(script), itinerary());
        let id = mgr.create().await;
        mgr.handle_message(Some(id), "one", today()).await.unwrap();
        mgr.handle_message(Some(id), "two", today()).await.unwrap();

        let third = applied(mgr.handle_message(Some(id), "actually Berlin", today()).await.unwrap());
        assert!(third.done);
        assert_eq!(third.variables.destination.as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn unknown_conversation_errors() {
        let mgr = manager(ScriptedInference::new(vec![]), itinerary());
        let missing = Uuid::new_v4();
        assert_eq!(
            mgr.view(missing).await.unwrap_err(),
            TrackerError::ConversationNotFound(missing)
        );
    }

    #[tokio::test]
    async fn correction_goes_through_manager() {
        let mgr = manager(ScriptedInference::new(full_script()), itinerary());
        let id = mgr.create().await;
        mgr.handle_message(Some(id), "Paris from London", today()).await.unwrap();

        let view = mgr
            .correct_slot(id, SlotField::DepartureCity, Some("Dublin"), today())
            .await
            .unwrap();
        assert_eq!(view.variables.departure_city.as_deref(), Some("Dublin"));
    }

    #[tokio::test]
    async fn result_after_correction_is_discarded() {
        let gated = Arc::new(GatedInference {
            started: Notify::new(),
            release: Notify::new(),
        });
        let mgr = Arc::new(ConversationManager::new(
            gated.clone(),
            itinerary(),
            ManagerConfig::default(),
        ));
        let id = mgr.create().await;

        let task = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.handle_message(Some(id), "Paris", today()).await })
        };

        gated.started.notified().await;
        mgr.correct_slot(id, SlotField::Destination, Some("Rome"), today())
            .await
            .unwrap();
        gated.release.notify_one();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, ChatOutcome::StaleResultDiscarded { .. }));

        let view = mgr.view(id).await.unwrap();
        assert_eq!(view.variables.destination.as_deref(), Some("Rome"));
        assert!(view.history.is_empty());
    }

    #[tokio::test]
    async fn registry_is_bounded_by_capacity() {
        let mgr = ConversationManager::new(
            ScriptedInference::new(vec![]),
            itinerary(),
            ManagerConfig {
                max_conversations: 3,
                ..ManagerConfig::default()
            },
        );

        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(mgr.create().await);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(mgr.conversation_count().await, 3);

        for id in &ids[..7] {
            assert_eq!(
                mgr.view(*id).await.unwrap_err(),
                TrackerError::ConversationNotFound(*id)
            );
        }
        for id in &ids[7..] {
            assert!(mgr.view(*id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn recently_active_conversation_survives_eviction() {
        let mgr = ConversationManager::new(
            ScriptedInference::new(vec![]),
            itinerary(),
            ManagerConfig {
                max_conversations: 2,
                ..ManagerConfig::default()
            },
        );
        let first = mgr.create().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = mgr.create().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        mgr.view(first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        mgr.create().await;
        assert!(mgr.view(first).await.is_ok());
        assert!(mgr.view(second).await.is_err());
    }

    #[tokio::test]
    async fn idle_conversations_are_pruned() {
        let mgr = ConversationManager::new(
            ScriptedInference::new(vec![]),
            itinerary(),
            ManagerConfig {
                idle_timeout: Duration::from_millis(50),
                ..ManagerConfig::default()
            },
        );
        for _ in 0..5 {
            mgr.create().await;
        }
        assert_eq!(mgr.prune_stale_sessions().await, 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let fresh = mgr.create().await;
        assert_eq!(mgr.conversation_count().await, 1);
        assert!(mgr.view(fresh).await.is_ok());
        assert_eq!(mgr.prune_stale_sessions().await, 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_registered() {
        let mgr = manager(ScriptedInference::new(vec![]), itinerary());
        let missing = Uuid::new_v4();

        assert_eq!(
            mgr.reset(missing).await.unwrap_err(),
            TrackerError::ConversationNotFound(missing)
        );
        let err = mgr.handle_message(Some(missing), "hi", today()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Tracker(TrackerError::ConversationNotFound(id)) if id == missing
        ));
        assert_eq!(mgr.conversation_count().await, 0);

        let outcome = applied(mgr.handle_message(None, "hi", today()).await.unwrap());
        assert_eq!(mgr.conversation_count().await, 1);
        assert!(mgr.view(outcome.conversation_id).await.is_ok());
    }

    #[tokio::test]
    async fn builds_from_default_config() {
        let config = PlannerConfig::from_lookup(|_| None).unwrap();
        let mgr = ConversationManager::from_config(&config).unwrap();
        assert_eq!(mgr.backend_name(), "rest");
        assert_eq!(mgr.conversation_count().await, 0);
    }
}
