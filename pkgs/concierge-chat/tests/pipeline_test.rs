// Tests for the guest chat pipeline

use async_trait::async_trait;
use concierge_chat::{
    AnalysisError, AnalysisEvent, AnalysisRequest, AnalysisResult, AnalysisState, Analyzer,
    CacheConfig, ChatError, GuestChat, SendMessage,
};
use concierge_realtime::{BroadcastFeed, QueryCache, QueryKey, RealtimeClient};
use concierge_store::{ChangePublisher, Conversation, NewMessage, PersistenceConfig, Store};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::{broadcast, Notify};

enum Outcome {
    Enrich(AnalysisResult),
    Fail,
    Panic,
}

/// Analyzer that holds every call until `release` is notified
struct GatedAnalyzer {
    release: Arc<Notify>,
    outcome: Outcome,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl GatedAnalyzer {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            release: Arc::new(Notify::new()),
            outcome,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        self.requests.lock().push(request);
        self.release.notified().await;
        match &self.outcome {
            Outcome::Enrich(result) => Ok(result.clone()),
            Outcome::Fail => Err(AnalysisError::Status {
                status: 500,
                body: "upstream error".to_string(),
            }),
            Outcome::Panic => panic!("analyzer crashed"),
        }
    }
}

struct Harness {
    _db_file: NamedTempFile,
    store: Store,
    feed: Arc<BroadcastFeed>,
    cache: QueryCache,
    chat: GuestChat,
}

async fn harness(analyzer: Option<Arc<dyn Analyzer>>) -> Harness {
    let db_file = NamedTempFile::new().unwrap();
    let feed = BroadcastFeed::new(16);
    let store = Store::open(
        &PersistenceConfig {
            db_path: db_file.path().to_path_buf(),
            ..Default::default()
        },
        ChangePublisher::new(feed.clone()),
    )
    .await
    .expect("Failed to open store");

    let cache = QueryCache::new();
    let realtime = RealtimeClient::new(feed.clone(), cache.clone());
    let chat = GuestChat::new(store.clone(), realtime, analyzer, CacheConfig::default());

    Harness {
        _db_file: db_file,
        store,
        feed,
        cache,
        chat,
    }
}

async fn next_event(events: &mut broadcast::Receiver<AnalysisEvent>) -> AnalysisEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for analysis")
        .expect("analysis event stream closed")
}

fn count_invalidations(events: &mut broadcast::Receiver<QueryKey>, key: &QueryKey) -> usize {
    let mut count = 0;
    while let Ok(invalidated) = events.try_recv() {
        if &invalidated == key {
            count += 1;
        }
    }
    count
}

async fn conversation(h: &Harness) -> Conversation {
    h.chat
        .ensure_conversation("G1", "H1")
        .await
        .expect("Failed to ensure conversation")
}

#[tokio::test]
async fn test_send_inserts_one_guest_row() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    let message = h
        .chat
        .send_message(SendMessage::new(&conversation, "  Could I get extra towels?  "))
        .await
        .expect("Failed to send message");

    assert_eq!(message.message_text, "Could I get extra towels?");
    assert_eq!(message.sender_type, concierge_store::SenderType::Guest);
    assert!(!message.is_translated);
    assert!(message.created_by.is_none());

    let rows = h
        .store
        .messages()
        .list_for_conversation(&conversation.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, message.id);

    let event = next_event(&mut analysis).await;
    assert_eq!(event.state, AnalysisState::Skipped);
    assert_eq!(event.message_id, message.id);
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;

    for text in ["", "   ", "\n\t"] {
        let result = h
            .chat
            .send_message(SendMessage::new(&conversation, text))
            .await;
        assert!(matches!(result, Err(ChatError::EmptyMessage)));
    }

    let rows = h
        .store
        .messages()
        .list_for_conversation(&conversation.id)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_send_to_unknown_conversation() {
    let h = harness(None).await;
    let mut request = SendMessage::new(&conversation(&h).await, "Hello");
    request.conversation_id = "missing".to_string();

    let result = h.chat.send_message(request).await;
    assert!(matches!(result, Err(ChatError::ConversationNotFound(id)) if id == "missing"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_ensure_conversation_creates_one_row() {
    let h = harness(None).await;
    let a = h.chat.clone();
    let b = h.chat.clone();

    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.ensure_conversation("G1", "H1").await }),
        tokio::spawn(async move { b.ensure_conversation("G1", "H1").await }),
    );
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    let listed = h.store.conversations().list_for_guest("G1").await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_first_message_sets_last_message_at() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;
    assert!(conversation.last_message_at.is_none());

    let message = h
        .chat
        .send_message(SendMessage::new(&conversation, "Hello"))
        .await
        .unwrap();

    let stored = h
        .store
        .conversations()
        .get(&conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_message_at, Some(message.created_at));
}

#[tokio::test]
async fn test_send_invalidates_messages_and_conversations() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;
    let mut invalidations = h.cache.subscribe();

    h.chat
        .send_message(SendMessage::new(&conversation, "Hello"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(key) = invalidations.try_recv() {
        seen.push(key);
    }
    assert!(seen.contains(&QueryKey::guest_messages(&conversation.id)));
    assert!(seen.contains(&QueryKey::guest_conversations("G1")));

    // The cached conversation sits under the invalidated prefix
    assert!(h
        .cache
        .is_stale(&QueryKey::guest_conversations("G1").with("H1")));
}

#[tokio::test]
async fn test_list_messages_sorted_and_cached() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;

    for text in ["first", "second", "third"] {
        h.chat
            .send_message(SendMessage::new(&conversation, text))
            .await
            .unwrap();
    }

    let listed = h.chat.list_messages(&conversation.id).await.unwrap();
    let texts: Vec<_> = listed.iter().map(|m| m.message_text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at));

    // Served from cache until something invalidates it
    let misses = h.cache.stats().misses;
    h.chat.list_messages(&conversation.id).await.unwrap();
    assert_eq!(h.cache.stats().misses, misses);

    h.chat
        .send_message(SendMessage::new(&conversation, "fourth"))
        .await
        .unwrap();
    let listed = h.chat.list_messages(&conversation.id).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert_eq!(listed[3].message_text, "fourth");
}

#[tokio::test]
async fn test_send_returns_before_analysis_completes() {
    let analyzer = GatedAnalyzer::new(Outcome::Enrich(AnalysisResult::default()));
    let h = harness(Some(analyzer.clone())).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    let message = h
        .chat
        .send_message(SendMessage::new(&conversation, "Hola"))
        .await
        .unwrap();

    assert!(!message.is_translated);
    assert!(matches!(
        analysis.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    analyzer.release.notify_one();
    let event = next_event(&mut analysis).await;
    assert_eq!(event.state, AnalysisState::Complete);
}

#[tokio::test]
async fn test_analysis_success_enriches_and_invalidates_once() {
    let analyzer = GatedAnalyzer::new(Outcome::Enrich(AnalysisResult {
        translated_text: Some("Where is the pool?".to_string()),
        sentiment: Some("neutral".to_string()),
        urgency: Some("low".to_string()),
        topic: Some("amenities".to_string()),
        subtopic: None,
    }));
    let h = harness(Some(analyzer.clone())).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    let message = h
        .chat
        .send_message(
            SendMessage::new(&conversation, "¿Dónde está la piscina?").languages("es-ES", "English"),
        )
        .await
        .unwrap();

    let mut invalidations = h.cache.subscribe();
    analyzer.release.notify_one();

    let event = next_event(&mut analysis).await;
    assert_eq!(event.state, AnalysisState::Complete);
    assert_eq!(event.message_id, message.id);
    assert_eq!(
        count_invalidations(&mut invalidations, &QueryKey::guest_messages(&conversation.id)),
        1
    );

    let request = analyzer.requests.lock()[0].clone();
    assert_eq!(request.task, "full_pipeline");
    assert_eq!(request.message_id, message.id);
    assert_eq!(request.original_language, "es");
    assert_eq!(request.target_language, "en");
    assert_eq!(request.hotel_id, "H1");

    let stored = h.store.messages().get(&message.id).await.unwrap().unwrap();
    assert!(stored.is_translated);
    assert_eq!(stored.translated_text.as_deref(), Some("Where is the pool?"));
    assert_eq!(stored.topic.as_deref(), Some("amenities"));
    assert!(stored.subtopic.is_none());

    let listed = h.chat.list_messages(&conversation.id).await.unwrap();
    assert!(listed[0].is_translated);
}

#[tokio::test]
async fn test_analysis_failure_still_invalidates_once() {
    let analyzer = GatedAnalyzer::new(Outcome::Fail);
    let h = harness(Some(analyzer.clone())).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    let message = h
        .chat
        .send_message(SendMessage::new(&conversation, "Hello"))
        .await
        .unwrap();

    let mut invalidations = h.cache.subscribe();
    analyzer.release.notify_one();

    let event = next_event(&mut analysis).await;
    assert_eq!(event.state, AnalysisState::Failed);
    assert!(event.error.unwrap().contains("500"));
    assert_eq!(
        count_invalidations(&mut invalidations, &QueryKey::guest_messages(&conversation.id)),
        1
    );

    // The message itself is kept
    let stored = h.store.messages().get(&message.id).await.unwrap().unwrap();
    assert!(!stored.is_translated);
}

#[tokio::test]
async fn test_analysis_panic_is_a_failure() {
    let analyzer = GatedAnalyzer::new(Outcome::Panic);
    let h = harness(Some(analyzer.clone())).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    h.chat
        .send_message(SendMessage::new(&conversation, "Hello"))
        .await
        .unwrap();
    analyzer.release.notify_one();

    let event = next_event(&mut analysis).await;
    assert_eq!(event.state, AnalysisState::Failed);
}

#[tokio::test]
async fn test_disabled_analysis_adds_no_invalidation() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    h.chat
        .send_message(SendMessage::new(&conversation, "Hello"))
        .await
        .unwrap();
    let mut invalidations = h.cache.subscribe();

    assert_eq!(next_event(&mut analysis).await.state, AnalysisState::Skipped);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        count_invalidations(&mut invalidations, &QueryKey::guest_messages(&conversation.id)),
        0
    );
}

#[tokio::test]
async fn test_watch_messages_picks_up_staff_replies() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;

    let handle = h.chat.watch_messages(&conversation.id).await.unwrap();
    assert!(handle.is_active());
    assert_eq!(h.feed.channel_count(), 1);

    assert!(h.chat.list_messages(&conversation.id).await.unwrap().is_empty());

    let mut invalidations = h.cache.subscribe();
    h.store
        .messages()
        .insert(NewMessage::from_staff(&conversation, "staff-1", "Right away!"))
        .await
        .unwrap();

    let key = tokio::time::timeout(Duration::from_secs(5), invalidations.recv())
        .await
        .expect("timed out waiting for realtime invalidation")
        .unwrap();
    assert_eq!(key, QueryKey::guest_messages(&conversation.id));

    let listed = h.chat.list_messages(&conversation.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message_text, "Right away!");

    handle.unsubscribe();
    assert_eq!(h.feed.channel_count(), 0);
}

#[tokio::test]
async fn test_watch_without_conversation_is_inert() {
    let h = harness(None).await;
    let handle = h.chat.watch_messages("").await.unwrap();
    assert!(handle.channel_name().is_none());
    assert_eq!(h.feed.channel_count(), 0);
}

#[tokio::test]
async fn test_mark_staff_messages_read() {
    let h = harness(None).await;
    let conversation = conversation(&h).await;

    h.store
        .messages()
        .insert(NewMessage::from_staff(&conversation, "staff-1", "Welcome"))
        .await
        .unwrap();
    h.chat
        .send_message(SendMessage::new(&conversation, "Thanks"))
        .await
        .unwrap();

    let mut invalidations = h.cache.subscribe();
    assert_eq!(h.chat.mark_staff_messages_read(&conversation.id).await.unwrap(), 1);
    assert_eq!(
        count_invalidations(&mut invalidations, &QueryKey::unread_messages("G1")),
        1
    );
    assert_eq!(h.chat.mark_staff_messages_read(&conversation.id).await.unwrap(), 0);

    assert!(matches!(
        h.chat.mark_staff_messages_read("missing").await,
        Err(ChatError::ConversationNotFound(_))
    ));
}

#[tokio::test]
async fn test_analysis_settles_after_chat_is_dropped() {
    let analyzer = GatedAnalyzer::new(Outcome::Enrich(AnalysisResult {
        translated_text: Some("Good night".to_string()),
        ..Default::default()
    }));
    let h = harness(Some(analyzer.clone())).await;
    let conversation = conversation(&h).await;
    let mut analysis = h.chat.analysis_events();

    let message = h
        .chat
        .send_message(SendMessage::new(&conversation, "Buenas noches"))
        .await
        .unwrap();

    let Harness { store, chat, .. } = h;
    drop(chat);
    analyzer.release.notify_one();

    assert_eq!(next_event(&mut analysis).await.state, AnalysisState::Complete);
    let stored = store.messages().get(&message.id).await.unwrap().unwrap();
    assert_eq!(stored.translated_text.as_deref(), Some("Good night"));
}
