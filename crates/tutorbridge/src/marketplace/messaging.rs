//! Direct messages between a tutor and a student. Each pair shares one conversation,
//! created on first contact.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{newest_first, Filter, RepositoryError};

use super::domain::{Actor, Conversation, ConversationId, Message, MessageId, UserId};
use super::error::{MarketplaceError, MarketplaceResult};
use super::repository::Stores;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub tutor_id: UserId,
    pub student_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

#[derive(Clone)]
pub struct Messenger {
    stores: Stores,
}

impl Messenger {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// The pair's conversation, opening it when they have never talked.
    pub async fn ensure_conversation(
        &self,
        actor: &Actor,
        pair: NewConversation,
    ) -> MarketplaceResult<Conversation> {
        let NewConversation {
            tutor_id,
            student_id,
        } = pair;
        if !actor.is_admin() && actor.user_id != tutor_id && actor.user_id != student_id {
            return Err(MarketplaceError::forbidden(actor, "open conversations for others"));
        }
        if tutor_id == student_id {
            return Err(MarketplaceError::ValidationFailed {
                fields: vec!["student_id"],
            });
        }

        if let Some(existing) = self.find_pair(&tutor_id, &student_id).await? {
            return Ok(existing);
        }

        let record = Conversation {
            id: ConversationId::generate(),
            tutor_id: tutor_id.clone(),
            student_id: student_id.clone(),
            created_at: Utc::now(),
        };
        match self.stores.conversations.insert(record).await {
            Ok(created) => {
                info!(
                    conversation_id = %created.id,
                    tutor_id = %created.tutor_id,
                    student_id = %created.student_id,
                    "conversation opened"
                );
                Ok(created)
            }
            // Opened concurrently by the other participant.
            Err(RepositoryError::Conflict) => self
                .find_pair(&tutor_id, &student_id)
                .await?
                .ok_or_else(|| RepositoryError::Conflict.into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Conversations the actor takes part in, newest first. Admins see all of them.
    pub async fn list_conversations(&self, actor: &Actor) -> MarketplaceResult<Vec<Conversation>> {
        if actor.is_admin() {
            return Ok(self.stores.conversations.list(&Filter::new()).await?);
        }

        let own_id = actor.user_id.as_str();
        let mut conversations = self
            .stores
            .conversations
            .list(&Filter::new().eq("tutor_id", own_id))
            .await?;
        conversations.extend(
            self.stores
                .conversations
                .list(&Filter::new().eq("student_id", own_id))
                .await?,
        );
        conversations.sort_by(newest_first);
        conversations.dedup_by(|left, right| left.id == right.id);
        Ok(conversations)
    }

    /// Messages of a conversation, oldest first.
    pub async fn messages(
        &self,
        actor: &Actor,
        conversation_id: &ConversationId,
    ) -> MarketplaceResult<Vec<Message>> {
        let conversation = self.conversation(conversation_id).await?;
        if !actor.is_admin() && !conversation.includes(&actor.user_id) {
            return Err(MarketplaceError::forbidden(actor, "read this conversation"));
        }

        let filter = Filter::new().eq("conversation_id", conversation_id.as_str());
        let mut messages = self.stores.messages.list(&filter).await?;
        messages.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(messages)
    }

    /// Post a message as the actor. Only participants write to a conversation.
    pub async fn send(
        &self,
        actor: &Actor,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> MarketplaceResult<Message> {
        let conversation = self.conversation(conversation_id).await?;
        if !conversation.includes(&actor.user_id) {
            return Err(MarketplaceError::forbidden(actor, "write to this conversation"));
        }
        let content = message.content.trim().to_string();
        if content.is_empty() {
            return Err(MarketplaceError::ValidationFailed {
                fields: vec!["content"],
            });
        }

        let record = Message {
            id: MessageId::generate(),
            conversation_id: conversation.id,
            sender_id: actor.user_id.clone(),
            content,
            is_read: false,
            created_at: Utc::now(),
        };
        let stored = self.stores.messages.insert(record).await?;
        debug!(message_id = %stored.id, conversation_id = %stored.conversation_id, "message sent");
        Ok(stored)
    }

    /// Mark every unread message from the other participant as read. Returns how many
    /// changed.
    pub async fn mark_read(
        &self,
        actor: &Actor,
        conversation_id: &ConversationId,
    ) -> MarketplaceResult<usize> {
        let conversation = self.conversation(conversation_id).await?;
        if !conversation.includes(&actor.user_id) {
            return Err(MarketplaceError::forbidden(actor, "read this conversation"));
        }

        let unread = Filter::new()
            .eq("conversation_id", conversation_id.as_str())
            .eq("is_read", "false");
        let guard = Filter::new().eq("is_read", "false");
        let mut marked = 0;
        for message in self.stores.messages.list(&unread).await? {
            if message.sender_id == actor.user_id {
                continue;
            }
            let read = Message {
                is_read: true,
                ..message
            };
            if self.stores.messages.update_if(read, &guard).await?.is_some() {
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn conversation(&self, id: &ConversationId) -> MarketplaceResult<Conversation> {
        self.stores
            .conversations
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("conversation", id))
    }

    async fn find_pair(
        &self,
        tutor_id: &UserId,
        student_id: &UserId,
    ) -> MarketplaceResult<Option<Conversation>> {
        let filter = Filter::new()
            .eq("tutor_id", tutor_id.as_str())
            .eq("student_id", student_id.as_str());
        Ok(self
            .stores
            .conversations
            .list(&filter)
            .await?
            .into_iter()
            .next())
    }
}
