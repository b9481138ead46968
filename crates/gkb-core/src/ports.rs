//! Storage ports. MongoDB is the first implementation (`gkb-mongo`); the
//! shapes stay storage-agnostic so tests can run against in-memory fakes.

use async_trait::async_trait;

use crate::{
    catalog::{Lesson, Merch},
    domain::{ChatId, GuideId, LessonNumber, MessageId, ResourceRef, SharedKind},
    session::Session,
    Result,
};

/// Durable per-chat session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Absence is a valid state: the chat never interacted.
    async fn get(&self, chat: ChatId) -> Result<Option<Session>>;

    /// Creates the record if absent; sets `authenticated=true` and
    /// `is_admin=admin`. Never clears access sets.
    async fn upsert_authenticated(&self, chat: ChatId, admin: bool) -> Result<Session>;

    /// Resets both role flags; access sets stay untouched for future re-auth.
    async fn set_logged_out(&self, chat: ChatId) -> Result<()>;

    /// Idempotent set-insert; also sets `authenticated=true`.
    async fn grant_guide_access(&self, chat: ChatId, guide: &GuideId) -> Result<Session>;

    /// Idempotent set-insert; also sets `authenticated=true`.
    async fn grant_lesson_access(&self, chat: ChatId, lesson: LessonNumber) -> Result<Session>;

    /// Appends to the sent-message buffer. A no-op for chats without a
    /// session record. Must complete before the next inbound event from the
    /// same chat is processed.
    async fn record_sent_message(&self, chat: ChatId, message: MessageId) -> Result<()>;

    /// Returns and empties the buffer, in send order.
    async fn clear_sent_messages(&self, chat: ChatId) -> Result<Vec<MessageId>>;
}

/// Lesson/merch catalog, consumed by id; the core only reads the fields it
/// needs to render a menu entry or gate access.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All lessons, sorted by lesson number ascending.
    async fn lessons(&self) -> Result<Vec<Lesson>>;
    async fn lesson_by_number(&self, number: LessonNumber) -> Result<Option<Lesson>>;
    async fn insert_lesson(&self, lesson: &Lesson) -> Result<()>;
    /// Returns false when no lesson had that number.
    async fn delete_lesson(&self, number: LessonNumber) -> Result<bool>;

    async fn merch(&self) -> Result<Vec<Merch>>;
    async fn insert_merch(&self, merch: &Merch) -> Result<()>;
    /// Returns false when no listing had that name.
    async fn delete_merch(&self, name: &str) -> Result<bool>;
}

/// Keyed credential map: shared multi-valued sets (global/admin) plus one
/// secret per gated resource. Pure storage; comparison policy (trim + exact
/// match) lives in [`crate::auth`]. Concurrent writers to the same key are
/// last-writer-wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn shared_secrets(&self, kind: SharedKind) -> Result<Vec<String>>;
    async fn add_shared_secret(&self, kind: SharedKind, secret: &str) -> Result<()>;
    /// Returns false when the secret was not present.
    async fn remove_shared_secret(&self, kind: SharedKind, secret: &str) -> Result<bool>;

    async fn resource_secret(&self, resource: &ResourceRef) -> Result<Option<String>>;
    async fn set_resource_secret(&self, resource: &ResourceRef, secret: &str) -> Result<()>;
    /// Returns false when no secret existed for the resource.
    async fn remove_resource_secret(&self, resource: &ResourceRef) -> Result<bool>;
}
