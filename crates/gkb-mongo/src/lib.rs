//! MongoDB adapters for the storage ports.
//!
//! One collection per concern: `sessions` (one document per chat),
//! `lessons`, `merch`, and `credentials`. Session mutations go through
//! single-document atomic updates so concurrent grants from different chats
//! never clobber each other.

use async_trait::async_trait;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions},
    Client, Collection, Database,
};
use serde::{Deserialize, Serialize};

use gkb_core::{
    catalog::{Lesson, Merch},
    domain::{ChatId, GuideId, LessonNumber, MessageId, ResourceRef, SharedKind},
    ports::{CatalogStore, CredentialStore, SessionStore},
    session::Session,
    Error, Result,
};

fn store_err(e: mongodb::error::Error) -> Error {
    Error::Store(e.to_string())
}

/// Connects and pings the server so a bad URI fails at startup, not on the
/// first message.
pub async fn connect(uri: &str, database: &str) -> Result<Database> {
    let client = Client::with_uri_str(uri).await.map_err(store_err)?;
    let db = client.database(database);
    db.run_command(doc! { "ping": 1 }, None)
        .await
        .map_err(store_err)?;
    Ok(db)
}

pub struct MongoSessionStore {
    sessions: Collection<Session>,
}

impl MongoSessionStore {
    pub fn new(db: &Database) -> Self {
        Self {
            sessions: db.collection("sessions"),
        }
    }

    fn upsert_after() -> FindOneAndUpdateOptions {
        FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build()
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn get(&self, chat: ChatId) -> Result<Option<Session>> {
        self.sessions
            .find_one(doc! { "chat_id": chat.0 }, None)
            .await
            .map_err(store_err)
    }

    async fn upsert_authenticated(&self, chat: ChatId, admin: bool) -> Result<Session> {
        let session = self
            .sessions
            .find_one_and_update(
                doc! { "chat_id": chat.0 },
                doc! { "$set": { "authenticated": true, "is_admin": admin } },
                Self::upsert_after(),
            )
            .await
            .map_err(store_err)?;
        session.ok_or_else(|| Error::Store("upsert returned no session document".to_string()))
    }

    async fn set_logged_out(&self, chat: ChatId) -> Result<()> {
        self.sessions
            .update_one(
                doc! { "chat_id": chat.0 },
                doc! { "$set": { "authenticated": false, "is_admin": false } },
                None,
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn grant_guide_access(&self, chat: ChatId, guide: &GuideId) -> Result<Session> {
        let session = self
            .sessions
            .find_one_and_update(
                doc! { "chat_id": chat.0 },
                doc! {
                    "$set": { "authenticated": true },
                    "$addToSet": { "guide_access": &guide.0 },
                },
                Self::upsert_after(),
            )
            .await
            .map_err(store_err)?;
        session.ok_or_else(|| Error::Store("upsert returned no session document".to_string()))
    }

    async fn grant_lesson_access(&self, chat: ChatId, lesson: LessonNumber) -> Result<Session> {
        let session = self
            .sessions
            .find_one_and_update(
                doc! { "chat_id": chat.0 },
                doc! {
                    "$set": { "authenticated": true },
                    "$addToSet": { "lesson_access": lesson.0 },
                },
                Self::upsert_after(),
            )
            .await
            .map_err(store_err)?;
        session.ok_or_else(|| Error::Store("upsert returned no session document".to_string()))
    }

    async fn record_sent_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
        // No upsert: chats without a session record are not tracked.
        self.sessions
            .update_one(
                doc! { "chat_id": chat.0 },
                doc! { "$push": { "sent_message_ids": message.0 } },
                None,
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn clear_sent_messages(&self, chat: ChatId) -> Result<Vec<MessageId>> {
        let prior = self
            .sessions
            .find_one_and_update(
                doc! { "chat_id": chat.0 },
                doc! { "$set": { "sent_message_ids": [] } },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::Before)
                    .build(),
            )
            .await
            .map_err(store_err)?;
        Ok(prior.map(|s| s.sent_message_ids).unwrap_or_default())
    }
}

pub struct MongoCatalogStore {
    lessons: Collection<Lesson>,
    merch: Collection<Merch>,
}

impl MongoCatalogStore {
    pub fn new(db: &Database) -> Self {
        Self {
            lessons: db.collection("lessons"),
            merch: db.collection("merch"),
        }
    }
}

#[async_trait]
impl CatalogStore for MongoCatalogStore {
    async fn lessons(&self) -> Result<Vec<Lesson>> {
        let options = FindOptions::builder()
            .sort(doc! { "lesson_number": 1 })
            .build();
        let mut cursor = self
            .lessons
            .find(doc! {}, options)
            .await
            .map_err(store_err)?;
        let mut all = Vec::new();
        while cursor.advance().await.map_err(store_err)? {
            all.push(cursor.deserialize_current().map_err(store_err)?);
        }
        Ok(all)
    }

    async fn lesson_by_number(&self, number: LessonNumber) -> Result<Option<Lesson>> {
        self.lessons
            .find_one(doc! { "lesson_number": number.0 }, None)
            .await
            .map_err(store_err)
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<()> {
        self.lessons
            .insert_one(lesson, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_lesson(&self, number: LessonNumber) -> Result<bool> {
        let deleted = self
            .lessons
            .delete_one(doc! { "lesson_number": number.0 }, None)
            .await
            .map_err(store_err)?;
        Ok(deleted.deleted_count > 0)
    }

    async fn merch(&self) -> Result<Vec<Merch>> {
        let mut cursor = self.merch.find(doc! {}, None).await.map_err(store_err)?;
        let mut all = Vec::new();
        while cursor.advance().await.map_err(store_err)? {
            all.push(cursor.deserialize_current().map_err(store_err)?);
        }
        Ok(all)
    }

    async fn insert_merch(&self, merch: &Merch) -> Result<()> {
        self.merch
            .insert_one(merch, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_merch(&self, name: &str) -> Result<bool> {
        let deleted = self
            .merch
            .delete_one(doc! { "name": name }, None)
            .await
            .map_err(store_err)?;
        Ok(deleted.deleted_count > 0)
    }
}

/// One document per stored secret. Shared secrets have `resource_id: None`
/// and may repeat per kind; resource secrets are unique per
/// `(kind, resource_id)`.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialDoc {
    kind: String,
    resource_id: Option<String>,
    secret: String,
}

pub struct MongoCredentialStore {
    credentials: Collection<CredentialDoc>,
}

impl MongoCredentialStore {
    pub fn new(db: &Database) -> Self {
        Self {
            credentials: db.collection("credentials"),
        }
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn shared_secrets(&self, kind: SharedKind) -> Result<Vec<String>> {
        let mut cursor = self
            .credentials
            .find(
                doc! { "kind": kind.as_str(), "resource_id": null },
                None,
            )
            .await
            .map_err(store_err)?;
        let mut secrets = Vec::new();
        while cursor.advance().await.map_err(store_err)? {
            secrets.push(cursor.deserialize_current().map_err(store_err)?.secret);
        }
        Ok(secrets)
    }

    async fn add_shared_secret(&self, kind: SharedKind, secret: &str) -> Result<()> {
        // Upsert on the full document keeps re-adding the same secret
        // idempotent.
        self.credentials
            .update_one(
                doc! { "kind": kind.as_str(), "resource_id": null, "secret": secret },
                doc! { "$set": { "secret": secret } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn remove_shared_secret(&self, kind: SharedKind, secret: &str) -> Result<bool> {
        let deleted = self
            .credentials
            .delete_many(
                doc! { "kind": kind.as_str(), "resource_id": null, "secret": secret },
                None,
            )
            .await
            .map_err(store_err)?;
        Ok(deleted.deleted_count > 0)
    }

    async fn resource_secret(&self, resource: &ResourceRef) -> Result<Option<String>> {
        let found = self
            .credentials
            .find_one(
                doc! { "kind": resource.kind(), "resource_id": resource.id_string() },
                None,
            )
            .await
            .map_err(store_err)?;
        Ok(found.map(|d| d.secret))
    }

    async fn set_resource_secret(&self, resource: &ResourceRef, secret: &str) -> Result<()> {
        // Last-writer-wins on the resource key.
        self.credentials
            .update_one(
                doc! { "kind": resource.kind(), "resource_id": resource.id_string() },
                doc! { "$set": { "secret": secret } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn remove_resource_secret(&self, resource: &ResourceRef) -> Result<bool> {
        let deleted = self
            .credentials
            .delete_one(
                doc! { "kind": resource.kind(), "resource_id": resource.id_string() },
                None,
            )
            .await
            .map_err(store_err)?;
        Ok(deleted.deleted_count > 0)
    }
}
