use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId},
    messaging::types::{InlineKeyboard, Keyboard, MediaPhoto},
    Result,
};

/// Outbound transport port.
///
/// Telegram is the first implementation; the dialogue engine only ever talks
/// to this trait so its state machine can be tested against a fake.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str, keyboard: Keyboard)
        -> Result<MessageId>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: Option<&str>,
        buttons: Option<InlineKeyboard>,
    ) -> Result<MessageId>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageId>;

    async fn send_media_group(
        &self,
        chat_id: ChatId,
        photos: &[MediaPhoto],
    ) -> Result<Vec<MessageId>>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
