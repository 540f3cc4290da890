// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConversationEngine, EngineEvent, EngineSink};
use crate::context;
use crate::error::EngineError;
use crate::ledger::MessageDispatch;
use crate::model::{
    Message, MessageError, MessageErrorKind, MessageId, MessagePatch, NewMessage, NodeId,
    NodeMetaPatch, Role, StateId, LOADING_CONTENT,
};
use crate::service::{Chunk, CompletionEvent, CompletionRequest, GenerationError};
use crate::stream::{run_generation, GenerationOutcome};

/// Instruction appended to a node's transcript when asking for its summary.
pub const SUMMARY_PROMPT: &str = "Summarize the conversation above in a short paragraph. \
Keep the facts and decisions a follow-up question could depend on. Reply with the summary only.";

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    Finished,
    /// Stopped by the user; the partial content was kept.
    Cancelled,
    Failed(GenerationError),
}

/// What a send or regenerate produced. The assistant message exists in every case.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub status: GenerationStatus,
}

impl GenerationReport {
    pub fn into_result(self) -> Result<MessageId, EngineError> {
        match self.status {
            GenerationStatus::Finished => Ok(self.assistant_message_id),
            GenerationStatus::Cancelled => Err(EngineError::GenerationCancelled {
                message_id: self.assistant_message_id,
            }),
            GenerationStatus::Failed(source) => Err(EngineError::Generation {
                message_id: self.assistant_message_id,
                source,
            }),
        }
    }
}

#[derive(Debug)]
struct ResendPlan {
    state_id: StateId,
    node_id: NodeId,
    context: Vec<Message>,
    parent_id: MessageId,
}

impl ConversationEngine {
    /// Appends a user message to `node_id` and streams the assistant reply.
    ///
    /// The request carries the ancestor context followed by the node's own messages. A failed
    /// or cancelled generation is reported through [`GenerationReport::status`]; the placeholder
    /// message then carries the error tag or the partial text.
    pub async fn send_message(
        &self,
        node_id: &NodeId,
        content: &str,
    ) -> Result<GenerationReport, EngineError> {
        if content.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let state_id = self
            .lock()
            .graph
            .find_node(node_id)
            .map(|(state_id, _)| state_id.clone())
            .ok_or_else(|| EngineError::MetaNotFound {
                node_id: node_id.clone(),
            })?;

        self.set_creating_message(true);
        let result = self.send_in_state(&state_id, node_id, content).await;
        self.set_creating_message(false);
        result
    }

    async fn send_in_state(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        content: &str,
    ) -> Result<GenerationReport, EngineError> {
        let user_id = self
            .create_message(state_id, NewMessage::user(node_id.clone(), content))
            .await?;
        let context = self.context_with_own_messages(state_id, node_id)?;
        self.core_process(state_id, node_id, context, user_id).await
    }

    /// Generates a fresh reply for the turn `message_id` belongs to.
    ///
    /// For a user message the transcript up to and including it is sent; for an assistant
    /// message the transcript up to its parent user message.
    pub async fn resend_message(
        &self,
        message_id: &MessageId,
    ) -> Result<GenerationReport, EngineError> {
        let plan = self.plan_resend(message_id)?;
        self.core_process(&plan.state_id, &plan.node_id, plan.context, plan.parent_id)
            .await
    }

    pub async fn regenerate_message(
        &self,
        message_id: &MessageId,
    ) -> Result<GenerationReport, EngineError> {
        self.resend_message(message_id).await
    }

    /// Regenerates `message_id` and removes it.
    ///
    /// The resend is planned and started before the delete is issued.
    pub async fn delete_and_regenerate(
        &self,
        message_id: &MessageId,
    ) -> Result<GenerationReport, EngineError> {
        let plan = self.plan_resend(message_id)?;
        let (report, deleted) = tokio::join!(
            self.core_process(&plan.state_id, &plan.node_id, plan.context, plan.parent_id),
            self.remove_messages(&plan.state_id, &plan.node_id, vec![message_id.clone()]),
        );
        if let Err(err) = deleted {
            warn!(message_id = %message_id, error = %err, "could not delete regenerated message");
        }
        report
    }

    /// Stops one generation, or every generation when `message_id` is `None`.
    ///
    /// Returns the stopped ids; stopping with nothing in flight is a no-op.
    pub fn stop_generate_message(&self, message_id: Option<&MessageId>) -> Vec<MessageId> {
        let stopped = self.inner.generations.cancel(message_id);
        if stopped.is_empty() {
            debug!("no generation to stop");
            return stopped;
        }
        info!(count = stopped.len(), "generation stopped");
        self.emit(EngineEvent::LoadingChanged);
        stopped
    }

    /// Summarises a node's messages (the focus node by default) and stores the summary.
    pub async fn generate_summary(&self, node_id: Option<&NodeId>) -> Result<String, EngineError> {
        let node_id = match node_id {
            Some(node_id) => node_id.clone(),
            None => self.focus_node_id().ok_or(EngineError::NoFocusNode)?,
        };
        let messages = {
            let mut state = self.lock();
            let (state_id, _) =
                state
                    .graph
                    .find_node(&node_id)
                    .ok_or_else(|| EngineError::NodeNotFound {
                        node_id: node_id.clone(),
                    })?;
            let messages = state.ledger.messages(state_id, &node_id).to_vec();
            if messages.is_empty() {
                warn!(node_id = %node_id, "no messages to summarize");
                return Err(EngineError::NoMessages { node_id });
            }
            if state.is_generating_summary {
                return Err(EngineError::SummaryInProgress);
            }
            state.is_generating_summary = true;
            messages
        };
        self.emit(EngineEvent::LoadingChanged);

        let result = self.summarize(&node_id, messages.clone()).await;
        let is_latest = {
            let mut state = self.lock();
            state.is_generating_summary = false;
            state
                .graph
                .find_node(&node_id)
                .is_some_and(|(state_id, _)| state.ledger.messages(state_id, &node_id) == messages)
        };
        self.emit(EngineEvent::LoadingChanged);
        let summary = result?;

        if !is_latest {
            warn!(node_id = %node_id, "messages changed while summarizing; summary stored as stale");
        }
        self.update_node_meta(
            &node_id,
            NodeMetaPatch {
                summary: Some(summary.clone()),
                is_latest_summary: Some(is_latest),
                ..NodeMetaPatch::default()
            },
        )?;
        info!(node_id = %node_id, chars = summary.len(), is_latest, "summary generated");
        Ok(summary)
    }

    /// Deletes a message of the focus node.
    pub async fn delete_message(&self, message_id: &MessageId) -> Result<(), EngineError> {
        let (state_id, node_id) = self.locate_message(message_id)?;
        if self.focus_node_id().as_ref() != Some(&node_id) {
            warn!(message_id = %message_id, "message is not in the focused node");
            return Err(EngineError::MessageNotFound {
                message_id: message_id.clone(),
            });
        }
        self.remove_messages(&state_id, &node_id, vec![message_id.clone()])
            .await
    }

    pub async fn update_message_content(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), EngineError> {
        let (state_id, node_id) = self.locate_message(message_id)?;
        let patch = MessagePatch::content(content);
        self.dispatch(
            &state_id,
            &node_id,
            &MessageDispatch::update(message_id.clone(), patch.clone()),
        );

        if let Err(source) = self.inner.persistence.update_message(message_id, &patch).await {
            self.tag_update_failure(&state_id, &node_id, message_id, &source.to_string());
            return Err(EngineError::UpdateMessage { source });
        }
        Ok(())
    }

    /// Inserts an optimistic message, then swaps in the authoritative id.
    ///
    /// Every appended message makes the node's summary stale. On failure the placeholder stays,
    /// tagged with `CreateMessageError`.
    async fn create_message(
        &self,
        state_id: &StateId,
        value: NewMessage,
    ) -> Result<MessageId, EngineError> {
        let node_id = value.graph_node_id.clone();
        let temp_id = MessageId::temporary();
        self.dispatch(
            state_id,
            &node_id,
            &MessageDispatch::create(temp_id.clone(), value.clone()),
        );
        self.mark_summary_stale(&node_id);
        self.set_message_loading(&temp_id, true);

        let result = self.inner.persistence.create_message(&value).await;
        self.set_message_loading(&temp_id, false);

        match result {
            Ok(id) => {
                self.dispatch(
                    state_id,
                    &node_id,
                    &MessageDispatch::ReconcileMessage {
                        temp_id,
                        id: id.clone(),
                    },
                );
                Ok(id)
            }
            Err(source) => {
                warn!(
                    message_id = %temp_id,
                    node_id = %node_id,
                    error = %source,
                    "message create failed; placeholder kept with error"
                );
                let error = MessageError::new(MessageErrorKind::CreateMessageError, source.to_string());
                self.dispatch(
                    state_id,
                    &node_id,
                    &MessageDispatch::update(temp_id, MessagePatch::error(error)),
                );
                Err(EngineError::CreateMessage { source })
            }
        }
    }

    /// Creates the assistant placeholder under `parent_id` and streams into it.
    async fn core_process(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        context: Vec<Message>,
        parent_id: MessageId,
    ) -> Result<GenerationReport, EngineError> {
        let model = &self.inner.config.model;
        let placeholder = NewMessage {
            role: Role::Assistant,
            content: LOADING_CONTENT.to_owned(),
            graph_node_id: node_id.clone(),
            parent_id: Some(parent_id.clone()),
            model: Some(model.model.clone()),
            provider: Some(model.provider.clone()),
        };
        let assistant_id = self.create_message(state_id, placeholder).await?;
        let status = self
            .generate(state_id, node_id, context, &assistant_id)
            .await;
        Ok(GenerationReport {
            user_message_id: parent_id,
            assistant_message_id: assistant_id,
            status,
        })
    }

    async fn generate(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        messages: Vec<Message>,
        message_id: &MessageId,
    ) -> GenerationStatus {
        let cancel = self.inner.generations.begin(message_id);
        self.emit(EngineEvent::LoadingChanged);

        let model = &self.inner.config.model;
        let request = CompletionRequest {
            messages,
            model: model.model.clone(),
            provider: model.provider.clone(),
            params: self.inner.config.effective_params(),
            cancel,
        };
        let sink = EngineSink {
            engine: self,
            state_id,
            node_id,
        };
        let outcome = run_generation(
            self.inner.completion.as_ref(),
            request,
            message_id,
            &sink,
        )
        .await;
        if self.inner.generations.finish(message_id) {
            self.emit(EngineEvent::LoadingChanged);
        }

        match outcome {
            GenerationOutcome::Finished { patch } => {
                self.persist_generated(state_id, node_id, message_id, patch)
                    .await;
                GenerationStatus::Finished
            }
            GenerationOutcome::Cancelled { mut patch } => {
                patch.content = self.message(message_id).map(|message| message.content);
                self.persist_generated(state_id, node_id, message_id, patch)
                    .await;
                GenerationStatus::Cancelled
            }
            GenerationOutcome::Failed { error } => {
                let tag = MessageError::new(MessageErrorKind::GenerationError, error.to_string());
                self.persist_generated(state_id, node_id, message_id, MessagePatch::error(tag))
                    .await;
                GenerationStatus::Failed(error)
            }
        }
    }

    async fn persist_generated(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        message_id: &MessageId,
        patch: MessagePatch,
    ) {
        self.dispatch(
            state_id,
            node_id,
            &MessageDispatch::update(message_id.clone(), patch.clone()),
        );
        if let Err(source) = self.inner.persistence.update_message(message_id, &patch).await {
            self.tag_update_failure(state_id, node_id, message_id, &source.to_string());
        }
    }

    fn tag_update_failure(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        message_id: &MessageId,
        reason: &str,
    ) {
        warn!(message_id = %message_id, error = %reason, "message update failed");
        let error = MessageError::new(MessageErrorKind::UpdateMessageError, reason);
        self.dispatch(
            state_id,
            node_id,
            &MessageDispatch::update(message_id.clone(), MessagePatch::error(error)),
        );
    }

    async fn remove_messages(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
        ids: Vec<MessageId>,
    ) -> Result<(), EngineError> {
        let persisted = ids
            .iter()
            .filter(|id| !id.is_temporary())
            .cloned()
            .collect::<Vec<_>>();
        if !persisted.is_empty() {
            self.inner.persistence.delete_messages(&persisted).await?;
        }
        self.dispatch(state_id, node_id, &MessageDispatch::delete(ids));
        Ok(())
    }

    async fn summarize(
        &self,
        node_id: &NodeId,
        mut messages: Vec<Message>,
    ) -> Result<String, EngineError> {
        messages.push(Message::synthetic(
            MessageId::derived("summary_request", node_id),
            Role::User,
            SUMMARY_PROMPT,
        ));
        let model = &self.inner.config.model;
        let request = CompletionRequest {
            messages,
            model: model.model.clone(),
            provider: model.provider.clone(),
            params: self.inner.config.effective_params(),
            cancel: CancellationToken::new(),
        };
        let failed = |source| EngineError::Summary {
            node_id: node_id.clone(),
            source,
        };

        let mut stream = self
            .inner
            .completion
            .stream_completion(request)
            .await
            .map_err(failed)?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event.map_err(failed)? {
                CompletionEvent::Chunk(Chunk::Text(chunk)) => text.push_str(&chunk),
                CompletionEvent::Chunk(_) => {}
                CompletionEvent::Finished { content, .. } => {
                    if !content.is_empty() {
                        text = content;
                    }
                    break;
                }
            }
        }

        let summary = text.trim();
        if summary.is_empty() {
            return Err(failed(GenerationError::NoResponse));
        }
        Ok(summary.to_owned())
    }

    fn plan_resend(&self, message_id: &MessageId) -> Result<ResendPlan, EngineError> {
        let state = self.lock();
        let (key, _) = state
            .ledger
            .find(message_id)
            .ok_or_else(|| EngineError::MessageNotFound {
                message_id: message_id.clone(),
            })?;
        let (state_id, node_id) = key.clone();

        let messages = state.ledger.messages(&state_id, &node_id);
        let index = messages
            .iter()
            .position(|message| &message.id == message_id)
            .ok_or_else(|| EngineError::MessageNotFound {
                message_id: message_id.clone(),
            })?;
        let end = match messages[index].role {
            Role::User => Some(index),
            Role::Assistant => messages[index]
                .parent_id
                .as_ref()
                .and_then(|parent| messages.iter().position(|message| &message.id == parent))
                .or_else(|| {
                    messages[..index]
                        .iter()
                        .rposition(|message| message.role == Role::User)
                }),
        };
        let end = end.ok_or_else(|| EngineError::NoMessages {
            node_id: node_id.clone(),
        })?;
        let turn = &messages[..=end];
        let parent_id = turn
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.id.clone())
            .ok_or_else(|| EngineError::NoMessages {
                node_id: node_id.clone(),
            })?;

        let canvas = state
            .graph
            .state(&state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;
        let mut context =
            context::resolve_context(canvas, &state.ledger, &node_id, &self.inner.config.context)
                .messages;
        context.extend_from_slice(turn);

        Ok(ResendPlan {
            state_id,
            node_id,
            context,
            parent_id,
        })
    }

    fn context_with_own_messages(
        &self,
        state_id: &StateId,
        node_id: &NodeId,
    ) -> Result<Vec<Message>, EngineError> {
        let state = self.lock();
        let canvas = state
            .graph
            .state(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;
        let mut messages =
            context::resolve_context(canvas, &state.ledger, node_id, &self.inner.config.context)
                .messages;
        messages.extend_from_slice(state.ledger.messages(state_id, node_id));
        Ok(messages)
    }

    fn locate_message(&self, message_id: &MessageId) -> Result<(StateId, NodeId), EngineError> {
        self.lock()
            .ledger
            .find(message_id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| EngineError::MessageNotFound {
                message_id: message_id.clone(),
            })
    }

    fn set_message_loading(&self, message_id: &MessageId, loading: bool) {
        let changed = {
            let mut state = self.lock();
            if loading {
                state.message_loading_ids.insert(message_id.clone())
            } else {
                state.message_loading_ids.remove(message_id)
            }
        };
        if changed {
            self.emit(EngineEvent::LoadingChanged);
        }
    }

    /// Counts sends in flight; the flag flips only on the first start and the last finish.
    fn set_creating_message(&self, creating: bool) {
        let changed = {
            let mut state = self.lock();
            let before = state.creating_messages;
            state.creating_messages = if creating {
                before + 1
            } else {
                before.saturating_sub(1)
            };
            (before == 0) != (state.creating_messages == 0)
        };
        if changed {
            self.emit(EngineEvent::LoadingChanged);
        }
    }

    fn mark_summary_stale(&self, node_id: &NodeId) {
        let stale = NodeMetaPatch {
            is_latest_summary: Some(false),
            ..NodeMetaPatch::default()
        };
        if let Err(err) = self.update_node_meta(node_id, stale) {
            warn!(node_id = %node_id, error = %err, "could not mark summary as stale");
        }
    }
}
