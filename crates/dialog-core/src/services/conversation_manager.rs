// ============================================================================
// Dialog Core - Conversation Manager
// File: crates/dialog-core/src/services/conversation_manager.rs
// ============================================================================
//! Session lifecycle, prompt assembly, and memory-pressure compaction

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::{ChatId, Conversation, Message, Mode, PromptFormat};
use crate::engine::GenerationEngine;
use crate::error::{DialogError, EngineError};
use crate::repositories::SessionStore;

/// Tunables for [`ConversationManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Persona prepended to every prompt; never stored in the turn log.
    pub system_prompt: String,
    pub prompt_format: PromptFormat,
    /// Upper bound on exhaustion events handled within one window-mode turn.
    pub max_compaction_rounds: usize,
    /// Per-attempt limit; `None` waits indefinitely.
    pub generation_timeout: Option<Duration>,
}

impl ManagerConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt_format: PromptFormat::default(),
            max_compaction_rounds: 1024,
            generation_timeout: None,
        }
    }
}

/// Orchestrates one chat turn against a session store and a generation engine
pub struct ConversationManager<S: SessionStore + ?Sized, E: GenerationEngine + ?Sized> {
    store: Arc<S>,
    engine: Arc<E>,
    config: ManagerConfig,
}

impl<S, E> ConversationManager<S, E>
where
    S: SessionStore + ?Sized,
    E: GenerationEngine + ?Sized,
{
    pub fn new(store: Arc<S>, engine: Arc<E>, config: ManagerConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    pub fn system_message(&self) -> Message {
        Message::system(self.config.system_prompt.clone())
    }

    /// Start a new session for `chat_id` owned by `owner`.
    pub async fn start_session(&self, chat_id: ChatId, owner: &str) -> Result<(), DialogError> {
        if self.store.session_exists(chat_id).await? {
            warn!(chat_id, "session already exists");
            return Err(DialogError::SessionAlreadyExists(chat_id));
        }

        self.store.start_session(chat_id, owner).await?;
        info!(chat_id, owner, "session started");
        Ok(())
    }

    /// Drop the turn log and unset the session flag. Idempotent.
    pub async fn reset_session(&self, chat_id: ChatId) -> Result<(), DialogError> {
        self.store.clear_session(chat_id).await?;
        self.store.end_session(chat_id).await?;
        info!(chat_id, "session reset");
        Ok(())
    }

    /// Generate a reply to `text` within the chat's history.
    ///
    /// The user message is persisted before the engine is called; the reply
    /// is persisted only once generation succeeded.
    pub async fn answer(
        &self,
        chat_id: ChatId,
        text: &str,
        mode: Option<Mode>,
    ) -> Result<String, DialogError> {
        let mode = mode.ok_or(DialogError::UndeterminedMode)?;

        if !self.store.session_exists(chat_id).await? {
            return Err(DialogError::NoSession(chat_id));
        }

        let mut conversation =
            Conversation::with_format(self.system_message(), self.config.prompt_format.clone());
        conversation.extend(self.store.get_turns(chat_id).await?);

        let user_message = Message::user(text);
        self.store.append_turn(chat_id, &user_message).await?;
        conversation.push(user_message);

        debug!(
            chat_id,
            mode = mode.as_str(),
            messages = conversation.len(),
            size = conversation.size(),
            "conversation assembled"
        );

        let output = match mode {
            Mode::Window => self.generate_with_compaction(chat_id, &mut conversation).await?,
            Mode::Inline => self.generate_once(chat_id, &conversation).await?,
        };

        let bot_message = Message::bot(output.clone());
        self.store.append_turn(chat_id, &bot_message).await?;
        conversation.push(bot_message);

        Ok(output)
    }

    /// Evict oldest non-system turns, in memory and in the store, until the
    /// conversation fits `target_size` characters (default: one less than now).
    ///
    /// Fails with `CannotCompactFurther` once only the system message is left.
    pub async fn compact(
        &self,
        chat_id: ChatId,
        conversation: &mut Conversation,
        target_size: Option<usize>,
    ) -> Result<(), DialogError> {
        let target = target_size.unwrap_or_else(|| conversation.size().saturating_sub(1));
        // Without an explicit target at least one turn goes, even at size zero.
        let mut must_evict = target_size.is_none();

        while (conversation.size() > target || must_evict) && conversation.len() > 1 {
            self.store.pop_oldest_turn(chat_id).await?;
            if let Some(evicted) = conversation.evict_oldest() {
                must_evict = false;
                debug!(
                    chat_id,
                    role = evicted.role().as_str(),
                    evicted_size = evicted.size(),
                    remaining = conversation.len(),
                    "evicted oldest turn"
                );
            }
        }

        if conversation.len() < 2 {
            warn!(chat_id, "nothing left to evict");
            return Err(DialogError::CannotCompactFurther(chat_id));
        }

        Ok(())
    }

    async fn generate_with_compaction(
        &self,
        chat_id: ChatId,
        conversation: &mut Conversation,
    ) -> Result<String, DialogError> {
        let mut rounds = 0usize;

        loop {
            match self.attempt(chat_id, conversation).await {
                Ok(output) => return Ok(output),
                Err(EngineError::ResourceExhausted(reason)) => {
                    rounds += 1;
                    warn!(
                        chat_id,
                        size = conversation.size(),
                        messages = conversation.len(),
                        attempt = rounds,
                        %reason,
                        "engine out of memory, compacting conversation"
                    );

                    if rounds > self.config.max_compaction_rounds {
                        error!(
                            chat_id,
                            rounds, "compaction round limit reached, giving up"
                        );
                        return Err(DialogError::CannotCompactFurther(chat_id));
                    }

                    self.compact(chat_id, conversation, None).await?;
                }
                Err(e) => {
                    error!(chat_id, error = ?e, "generation failed");
                    return Err(e.into());
                }
            }
        }
    }

    async fn generate_once(
        &self,
        chat_id: ChatId,
        conversation: &Conversation,
    ) -> Result<String, DialogError> {
        match self.attempt(chat_id, conversation).await {
            Ok(output) => Ok(output),
            Err(e @ EngineError::ResourceExhausted(_)) => {
                warn!(chat_id, size = conversation.size(), "engine out of memory in inline mode");
                Err(e.into())
            }
            Err(e) => {
                error!(chat_id, error = ?e, "generation failed");
                Err(e.into())
            }
        }
    }

    /// One engine call; working memory is released when this returns,
    /// on every path.
    async fn attempt(
        &self,
        chat_id: ChatId,
        conversation: &Conversation,
    ) -> Result<String, EngineError> {
        let _release = ReleaseOnDrop(&*self.engine);
        let prompt = conversation.prompt();
        let started = Instant::now();

        let result = match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.engine.generate(&prompt))
                .await
                .unwrap_or(Err(EngineError::Timeout(limit))),
            None => self.engine.generate(&prompt).await,
        };

        debug!(
            chat_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "generation attempt finished"
        );
        result
    }
}

struct ReleaseOnDrop<'a, E: GenerationEngine + ?Sized>(&'a E);

impl<E: GenerationEngine + ?Sized> Drop for ReleaseOnDrop<'_, E> {
    fn drop(&mut self) {
        self.0.release_working_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockGenerationEngine;
    use crate::repositories::InMemorySessionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const CHAT: ChatId = 1;
    const HELLO: &str = "Hello, world!";
    const REPLY: &str = "Hello, You!";

    fn exhausted() -> EngineError {
        EngineError::ResourceExhausted("CUDA out of memory".into())
    }

    /// Engine mock that tolerates any number of release calls.
    fn engine() -> MockGenerationEngine {
        let mut engine = MockGenerationEngine::new();
        engine.expect_release_working_memory().returning(|| ());
        engine
    }

    fn manager(
        store: &Arc<InMemorySessionStore>,
        engine: MockGenerationEngine,
    ) -> ConversationManager<InMemorySessionStore, MockGenerationEngine> {
        ConversationManager::new(store.clone(), Arc::new(engine), ManagerConfig::new("sys"))
    }

    async fn seeded_store(turns: &[Message]) -> Arc<InMemorySessionStore> {
        let store = Arc::new(InMemorySessionStore::new());
        store.start_session(CHAT, "john").await.unwrap();
        for turn in turns {
            store.append_turn(CHAT, turn).await.unwrap();
        }
        store
    }

    fn four_turns() -> Vec<Message> {
        vec![
            Message::user("u1"),
            Message::bot("b1"),
            Message::user("u2"),
            Message::bot("b2"),
        ]
    }

    #[tokio::test]
    async fn test_start_session_on_fresh_chat() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(&store, engine());

        manager.start_session(CHAT, "john").await.unwrap();

        assert!(store.session_exists(CHAT).await.unwrap());
        assert_eq!(store.owner(CHAT).as_deref(), Some("john"));
    }

    #[tokio::test]
    async fn test_start_session_twice_fails_without_mutation() {
        let store = seeded_store(&[Message::user(HELLO)]).await;
        let manager = manager(&store, engine());

        let err = manager.start_session(CHAT, "mallory").await.unwrap_err();

        assert!(matches!(err, DialogError::SessionAlreadyExists(CHAT)));
        assert_eq!(store.owner(CHAT).as_deref(), Some("john"));
        assert_eq!(store.snapshot(CHAT), vec![Message::user(HELLO)]);
    }

    #[tokio::test]
    async fn test_answer_without_mode_is_rejected_before_engine() {
        let store = seeded_store(&[]).await;
        let mut engine = engine();
        engine.expect_generate().never();
        let manager = manager(&store, engine);

        let err = manager.answer(CHAT, HELLO, None).await.unwrap_err();

        assert!(matches!(err, DialogError::UndeterminedMode));
        assert!(store.snapshot(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_answer_without_session_never_calls_engine() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut engine = engine();
        engine.expect_generate().never();
        let manager = manager(&store, engine);

        for mode in [Mode::Window, Mode::Inline] {
            let err = manager.answer(CHAT, HELLO, Some(mode)).await.unwrap_err();
            assert!(matches!(err, DialogError::NoSession(CHAT)));
        }
        assert!(store.snapshot(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_answer_persists_user_before_and_bot_after_generation() {
        let store = seeded_store(&[]).await;
        let observed = store.clone();
        let mut engine = engine();
        engine.expect_generate().times(1).returning(move |prompt| {
            // The user turn is durable while the engine runs; the reply is not.
            assert_eq!(observed.snapshot(CHAT), vec![Message::user(HELLO)]);
            assert!(prompt.starts_with("<s>system\nsys</s>"));
            assert!(prompt.ends_with(&format!("<s>user\n{HELLO}</s>\n<s>bot")));
            Ok(REPLY.to_string())
        });
        let manager = manager(&store, engine);

        let output = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap();

        assert_eq!(output, REPLY);
        assert_eq!(
            store.snapshot(CHAT),
            vec![Message::user(HELLO), Message::bot(REPLY)]
        );
    }

    #[tokio::test]
    async fn test_failed_answer_keeps_user_message_only() {
        for (mode, failure) in [
            (Mode::Inline, exhausted()),
            (Mode::Inline, EngineError::Failed("boom".into())),
            (Mode::Window, EngineError::Failed("boom".into())),
        ] {
            let store = seeded_store(&[]).await;
            let mut engine = engine();
            let failure_clone = failure.clone();
            engine
                .expect_generate()
                .times(1)
                .returning(move |_| Err(failure_clone.clone()));
            let manager = manager(&store, engine);

            let err = manager.answer(CHAT, HELLO, Some(mode)).await.unwrap_err();

            assert!(matches!(err, DialogError::Engine(ref e) if *e == failure));
            assert_eq!(store.snapshot(CHAT), vec![Message::user(HELLO)]);
        }
    }

    #[tokio::test]
    async fn test_inline_mode_does_not_retry_on_exhaustion() {
        let store = seeded_store(&four_turns()).await;
        let mut engine = engine();
        engine.expect_generate().times(1).returning(|_| Err(exhausted()));
        let manager = manager(&store, engine);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Inline)).await.unwrap_err();

        assert!(err.is_out_of_memory());
        assert!(matches!(err, DialogError::Engine(EngineError::ResourceExhausted(_))));
        // Nothing evicted: full history plus the new user turn.
        assert_eq!(store.snapshot(CHAT).len(), 5);
    }

    #[tokio::test]
    async fn test_window_mode_retries_once_after_exhaustion() {
        let store = seeded_store(&[Message::user(HELLO), Message::bot(HELLO)]).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut engine = engine();
        engine.expect_generate().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(exhausted())
            } else {
                Ok(REPLY.to_string())
            }
        });
        let manager = manager(&store, engine);

        let output = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap();

        assert_eq!(output, REPLY);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.snapshot(CHAT),
            vec![Message::bot(HELLO), Message::user(HELLO), Message::bot(REPLY)]
        );
    }

    #[tokio::test]
    async fn test_eviction_drops_exactly_the_oldest_turn() {
        let store = seeded_store(&four_turns()).await;
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = prompts.clone();
        let mut engine = engine();
        engine.expect_generate().times(2).returning(move |prompt| {
            let mut seen = seen.lock().unwrap();
            seen.push(prompt.to_string());
            if seen.len() == 1 {
                Err(exhausted())
            } else {
                Ok(REPLY.to_string())
            }
        });
        let manager = manager(&store, engine);

        manager.answer(CHAT, "new", Some(Mode::Window)).await.unwrap();

        let mut expected = Conversation::new(Message::system("sys"));
        expected.extend([
            Message::bot("b1"),
            Message::user("u2"),
            Message::bot("b2"),
            Message::user("new"),
        ]);
        assert_eq!(prompts.lock().unwrap()[1], expected.prompt());
        assert_eq!(
            store.snapshot(CHAT),
            vec![
                Message::bot("b1"),
                Message::user("u2"),
                Message::bot("b2"),
                Message::user("new"),
                Message::bot(REPLY),
            ]
        );
    }

    #[tokio::test]
    async fn test_window_mode_stops_at_system_floor() {
        // k = 4 stored turns + the new user turn.
        let store = seeded_store(&four_turns()).await;
        let k = 5;
        let mut engine = engine();
        engine.expect_generate().times(k).returning(|_| Err(exhausted()));
        let manager = manager(&store, engine);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap_err();

        assert!(matches!(err, DialogError::CannotCompactFurther(CHAT)));
        assert!(err.is_out_of_memory());
        // Every evictable turn is gone from the store, and no reply was written.
        assert!(store.snapshot(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_error_is_not_retried_in_window_mode() {
        let store = seeded_store(&four_turns()).await;
        let mut engine = engine();
        engine
            .expect_generate()
            .times(1)
            .returning(|_| Err(EngineError::Failed("test exception".into())));
        let manager = manager(&store, engine);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap_err();

        assert!(!err.is_out_of_memory());
        assert_eq!(store.snapshot(CHAT).len(), 5);
    }

    #[tokio::test]
    async fn test_working_memory_released_after_every_attempt() {
        let store = seeded_store(&four_turns()).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut engine = MockGenerationEngine::new();
        engine.expect_generate().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(exhausted())
            } else {
                Ok(REPLY.to_string())
            }
        });
        engine.expect_release_working_memory().times(3).returning(|| ());
        let manager = manager(&store, engine);

        manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap();
    }

    #[tokio::test]
    async fn test_round_cap_stops_pathological_engine() {
        let store = seeded_store(&four_turns()).await;
        let mut engine = engine();
        engine.expect_generate().times(3).returning(|_| Err(exhausted()));
        let mut config = ManagerConfig::new("sys");
        config.max_compaction_rounds = 2;
        let manager = ConversationManager::new(store.clone(), Arc::new(engine), config);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap_err();

        assert!(matches!(err, DialogError::CannotCompactFurther(CHAT)));
        // Two rounds evicted two turns; the cap fired before a third.
        assert_eq!(store.snapshot(CHAT).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_is_an_engine_error() {
        struct Stalled;

        #[async_trait::async_trait]
        impl GenerationEngine for Stalled {
            async fn generate(&self, _prompt: &str) -> Result<String, EngineError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let store = seeded_store(&[]).await;
        let mut config = ManagerConfig::new("sys");
        config.generation_timeout = Some(Duration::from_secs(5));
        let manager = ConversationManager::new(store.clone(), Arc::new(Stalled), config);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap_err();

        assert!(matches!(
            err,
            DialogError::Engine(EngineError::Timeout(limit)) if limit == Duration::from_secs(5)
        ));
        assert_eq!(store.snapshot(CHAT), vec![Message::user(HELLO)]);
    }

    #[tokio::test]
    async fn test_compact_single_message_conversation_fails() {
        let store = seeded_store(&[]).await;
        let manager = manager(&store, engine());
        let mut conversation = Conversation::new(Message::system("sys"));

        let err = manager.compact(CHAT, &mut conversation, None).await.unwrap_err();

        assert!(matches!(err, DialogError::CannotCompactFurther(CHAT)));
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_compact_default_target_evicts_one() {
        let store = seeded_store(&four_turns()).await;
        let manager = manager(&store, engine());
        let mut conversation = Conversation::new(Message::system("sys"));
        conversation.extend(store.snapshot(CHAT));

        manager.compact(CHAT, &mut conversation, None).await.unwrap();

        assert_eq!(conversation.len(), 4);
        assert_eq!(store.snapshot(CHAT).len(), 3);
    }

    #[tokio::test]
    async fn test_compact_default_target_evicts_empty_turns() {
        let store = seeded_store(&[Message::user(""), Message::bot("")]).await;
        let manager =
            ConversationManager::new(store.clone(), Arc::new(engine()), ManagerConfig::new(""));
        let mut conversation = Conversation::new(manager.system_message());
        conversation.extend(store.snapshot(CHAT));
        assert_eq!(conversation.size(), 0);

        manager.compact(CHAT, &mut conversation, None).await.unwrap();

        assert_eq!(
            conversation.messages(),
            &[Message::system(""), Message::bot("")]
        );
        assert_eq!(store.snapshot(CHAT), vec![Message::bot("")]);
    }

    #[tokio::test]
    async fn test_window_mode_reaches_floor_with_empty_messages() {
        let store = seeded_store(&[Message::user("")]).await;
        let mut engine = engine();
        // One stored turn plus the new one: two evictions, two attempts.
        engine.expect_generate().times(2).returning(|_| Err(exhausted()));
        let manager =
            ConversationManager::new(store.clone(), Arc::new(engine), ManagerConfig::new(""));

        let err = manager.answer(CHAT, "", Some(Mode::Window)).await.unwrap_err();

        assert!(matches!(err, DialogError::CannotCompactFurther(CHAT)));
        assert!(store.snapshot(CHAT).is_empty());
    }

    #[tokio::test]
    async fn test_compact_to_explicit_target() {
        let turns = vec![
            Message::user(HELLO),
            Message::bot(HELLO),
            Message::user(HELLO),
            Message::bot(HELLO),
        ];
        let store = seeded_store(&turns).await;
        let manager = manager(&store, engine());
        let mut conversation = Conversation::new(Message::system("sys"));
        conversation.extend(turns);

        // 3 + 4 * 13 = 55 chars; fitting 3 + 2 * 13 needs two evictions.
        manager
            .compact(CHAT, &mut conversation, Some(3 + HELLO.len() * 2))
            .await
            .unwrap();

        assert_eq!(conversation.len(), 3);
        assert_eq!(store.snapshot(CHAT).len(), 2);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(&store, engine());

        manager.reset_session(CHAT).await.unwrap();
        assert!(!store.session_exists(CHAT).await.unwrap());
        manager.reset_session(CHAT).await.unwrap();
        assert!(!store.session_exists(CHAT).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_clears_log_and_allows_restart() {
        let store = seeded_store(&four_turns()).await;
        let manager = manager(&store, engine());

        manager.reset_session(CHAT).await.unwrap();

        assert!(store.snapshot(CHAT).is_empty());
        assert!(!store.session_exists(CHAT).await.unwrap());
        manager.start_session(CHAT, "john").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_log_fails_before_engine() {
        let store = seeded_store(&[]).await;
        store.push_raw(CHAT, "not json");
        let mut engine = engine();
        engine.expect_generate().never();
        let manager = manager(&store, engine);

        let err = manager.answer(CHAT, HELLO, Some(Mode::Window)).await.unwrap_err();

        assert!(matches!(err, DialogError::Store(_)));
    }
}
