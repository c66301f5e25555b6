//! Guest chat pipeline
//!
//! A guest message is inserted first and returned to the caller right away.
//! Analysis (translation, sentiment, urgency, topic) then runs detached; when
//! it settles, the conversation's message list is invalidated so readers
//! refetch the enriched row.

use crate::analyzer::{AnalysisRequest, AnalysisResult, Analyzer};
use crate::config::CacheConfig;
use crate::detached::{spawn_detached, DetachedPolicy, TaskFailure};
use crate::error::{AnalysisError, ChatError};
use crate::language::normalize_language_to_code;
use concierge_realtime::{QueryCache, QueryKey, RealtimeClient, Subscription, SubscriptionHandle};
use concierge_store::{Conversation, GuestMessage, NewMessage, SenderType, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const MESSAGES_TABLE: &str = "guest_messages";
const ANALYSIS_EVENT_BUFFER: usize = 64;

/// Where a message's analysis ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    /// Dispatched, not settled yet
    Pending,
    /// Analysis is disabled for this session
    Skipped,
    Complete,
    Failed,
}

/// Settled analysis of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub message_id: String,
    pub conversation_id: String,
    pub state: AnalysisState,
    pub error: Option<String>,
}

/// A guest message to send
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub conversation_id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub text: String,
    pub original_language: String,
    pub target_language: String,
}

impl SendMessage {
    pub fn new(conversation: &Conversation, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            guest_id: conversation.guest_id.clone(),
            hotel_id: conversation.hotel_id.clone(),
            text: text.into(),
            original_language: "en".to_string(),
            target_language: "en".to_string(),
        }
    }

    pub fn languages(
        mut self,
        original: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.original_language = original.into();
        self.target_language = target.into();
        self
    }
}

struct ChatInner {
    store: Store,
    cache: QueryCache,
    realtime: RealtimeClient,
    analyzer: Option<Arc<dyn Analyzer>>,
    policies: CacheConfig,
    events: broadcast::Sender<AnalysisEvent>,
}

impl ChatInner {
    fn emit(&self, message: &GuestMessage, state: AnalysisState, error: Option<String>) {
        // Nobody listening is fine
        let _ = self.events.send(AnalysisEvent {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            state,
            error,
        });
    }
}

/// Guest side of the chat with hotel staff
#[derive(Clone)]
pub struct GuestChat {
    inner: Arc<ChatInner>,
}

impl GuestChat {
    /// Without an analyzer every message is [`AnalysisState::Skipped`].
    pub fn new(
        store: Store,
        realtime: RealtimeClient,
        analyzer: Option<Arc<dyn Analyzer>>,
        policies: CacheConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(ANALYSIS_EVENT_BUFFER);
        Self {
            inner: Arc::new(ChatInner {
                store,
                cache: realtime.cache().clone(),
                realtime,
                analyzer,
                policies,
                events,
            }),
        }
    }

    pub fn analysis_enabled(&self) -> bool {
        self.inner.analyzer.is_some()
    }

    /// Settled analyses, for observers that care when enrichment lands
    pub fn analysis_events(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.inner.events.subscribe()
    }

    /// Get the guest's conversation with a hotel, creating it on first use.
    ///
    /// Cached under the guest's conversations key, one entry per hotel.
    pub async fn ensure_conversation(
        &self,
        guest_id: &str,
        hotel_id: &str,
    ) -> Result<Conversation, ChatError> {
        let key = QueryKey::guest_conversations(guest_id).with(hotel_id);
        let conversations = self.inner.store.conversations().clone();
        let (guest, hotel) = (guest_id.to_string(), hotel_id.to_string());

        self.inner
            .cache
            .fetch(&key, self.inner.policies.conversation_policy(), || async move {
                conversations
                    .ensure(&guest, &hotel)
                    .await
                    .map_err(ChatError::from)
            })
            .await
    }

    /// Send a guest message.
    ///
    /// Returns once the row is stored. Analysis runs detached and is never
    /// awaited here; its outcome only shows up as a refetch of the message
    /// list and on [`GuestChat::analysis_events`].
    pub async fn send_message(&self, request: SendMessage) -> Result<GuestMessage, ChatError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        debug!(
            "Sending message to conversation {} ({} chars, {} -> {})",
            request.conversation_id,
            text.len(),
            request.original_language,
            request.target_language
        );

        let store = &self.inner.store;
        if store
            .conversations()
            .get(&request.conversation_id)
            .await?
            .is_none()
        {
            return Err(ChatError::ConversationNotFound(request.conversation_id));
        }

        let message = store
            .messages()
            .insert(
                NewMessage::from_guest(
                    &request.conversation_id,
                    &request.guest_id,
                    &request.hotel_id,
                    text,
                )
                .languages(
                    request.original_language.clone(),
                    Some(request.target_language.clone()),
                ),
            )
            .await
            .map_err(|e| {
                error!("Failed to insert message: {}", e);
                ChatError::Database(e)
            })?;

        info!(
            "Message {} stored in conversation {}",
            message.id, message.conversation_id
        );

        if let Err(e) = store
            .conversations()
            .touch_last_message(&message.conversation_id, message.created_at)
            .await
        {
            warn!(
                "Failed to update last_message_at of conversation {}: {}",
                message.conversation_id, e
            );
        }

        match &self.inner.analyzer {
            Some(analyzer) => self.dispatch_analysis(analyzer.clone(), &message, &request),
            None => {
                debug!("Analysis disabled, skipping message {}", message.id);
                self.inner.emit(&message, AnalysisState::Skipped, None);
            }
        }

        let cache = &self.inner.cache;
        cache.invalidate(&QueryKey::guest_messages(&message.conversation_id));
        cache.invalidate(&QueryKey::guest_conversations(&message.guest_id));

        Ok(message)
    }

    fn dispatch_analysis(
        &self,
        analyzer: Arc<dyn Analyzer>,
        message: &GuestMessage,
        request: &SendMessage,
    ) {
        let analysis = AnalysisRequest::full_pipeline(
            message.message_text.clone(),
            message.id.clone(),
            normalize_language_to_code(&request.original_language),
            normalize_language_to_code(&request.target_language),
            message.hotel_id.clone(),
        );
        debug!(
            "Analyzing message {} ({} -> {})",
            message.id, analysis.original_language, analysis.target_language
        );

        let store = self.inner.store.clone();
        let message_id = message.id.clone();
        let work = async move {
            let result = analyzer.analyze(analysis).await?;
            let enrichment = result.clone().into_enrichment();
            if !enrichment.is_empty() {
                store
                    .messages()
                    .apply_enrichment(&message_id, enrichment)
                    .await?;
            }
            Ok::<AnalysisResult, AnalysisError>(result)
        };

        let on_success = {
            let inner = self.inner.clone();
            let message = message.clone();
            move |_: AnalysisResult| {
                info!("Analysis of message {} completed", message.id);
                inner
                    .cache
                    .invalidate(&QueryKey::guest_messages(&message.conversation_id));
                inner.emit(&message, AnalysisState::Complete, None);
            }
        };

        let on_failure = {
            let inner = self.inner.clone();
            let message = message.clone();
            move |failure: TaskFailure<AnalysisError>| {
                error!("Analysis of message {} failed: {}", message.id, failure);
                inner
                    .cache
                    .invalidate(&QueryKey::guest_messages(&message.conversation_id));
                inner.emit(&message, AnalysisState::Failed, Some(failure.to_string()));
            }
        };

        spawn_detached(
            format!("analyze-{}", message.id),
            DetachedPolicy::NoRetryNoCancel,
            work,
            on_success,
            on_failure,
        );
    }

    /// Messages of a conversation, oldest first
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<GuestMessage>, ChatError> {
        let key = QueryKey::guest_messages(conversation_id);
        let messages = self.inner.store.messages().clone();
        let conversation_id = conversation_id.to_string();

        self.inner
            .cache
            .fetch(&key, self.inner.policies.messages_policy(), || async move {
                messages
                    .list_for_conversation(&conversation_id)
                    .await
                    .map_err(ChatError::from)
            })
            .await
    }

    /// Keep the message list of a conversation live. Dropping the handle
    /// stops it. An empty ID yields an inert handle.
    pub async fn watch_messages(
        &self,
        conversation_id: &str,
    ) -> Result<SubscriptionHandle, ChatError> {
        let subscription =
            Subscription::new(MESSAGES_TABLE, QueryKey::guest_messages(conversation_id))
                .filter(format!("conversation_id=eq.{}", conversation_id))
                .enabled(!conversation_id.is_empty());

        Ok(self.inner.realtime.subscribe(subscription).await?)
    }

    /// Mark staff messages of a conversation as read by the guest
    pub async fn mark_staff_messages_read(&self, conversation_id: &str) -> Result<u64, ChatError> {
        let conversation = self
            .inner
            .store
            .conversations()
            .get(conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;

        let marked = self
            .inner
            .store
            .messages()
            .mark_read(conversation_id, SenderType::Staff)
            .await?;

        if marked > 0 {
            let cache = &self.inner.cache;
            cache.invalidate(&QueryKey::guest_messages(conversation_id));
            cache.invalidate(&QueryKey::unread_messages(&conversation.guest_id));
        }

        Ok(marked)
    }
}
