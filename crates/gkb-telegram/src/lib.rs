//! Telegram adapter (teloxide).
//!
//! Implements the `gkb-core` MessagingPort over the Telegram Bot API and
//! hosts the long-polling dispatcher.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        ForceReply, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia,
        InputMediaPhoto, KeyboardButton, KeyboardMarkup, ReplyMarkup,
    },
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use gkb_core::{
    domain::{ChatId, MessageId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, Keyboard, MediaPhoto},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    fn reply_markup(keyboard: Keyboard) -> Option<ReplyMarkup> {
        match keyboard {
            Keyboard::None => None,
            Keyboard::Reply(k) => {
                let rows: Vec<Vec<KeyboardButton>> = k
                    .rows
                    .into_iter()
                    .map(|row| row.into_iter().map(KeyboardButton::new).collect())
                    .collect();
                let mut markup = KeyboardMarkup::new(rows);
                if k.resize {
                    markup = markup.resize_keyboard(true);
                }
                if k.one_time {
                    markup = markup.one_time_keyboard(true);
                }
                Some(ReplyMarkup::Keyboard(markup))
            }
            Keyboard::ForceReply => Some(ReplyMarkup::ForceReply(ForceReply::new())),
            Keyboard::Inline(k) => Some(ReplyMarkup::InlineKeyboard(Self::inline_markup(k))),
        }
    }

    fn inline_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(
            keyboard
                .buttons
                .into_iter()
                .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)]),
        )
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Keyboard,
    ) -> Result<MessageId> {
        let markup = Self::reply_markup(keyboard);
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), text.to_string());
                if let Some(m) = markup.clone() {
                    req = req.reply_markup(m);
                }
                req
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: Option<&str>,
        buttons: Option<InlineKeyboard>,
    ) -> Result<MessageId> {
        let markup = buttons.map(Self::inline_markup);
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_photo(Self::tg_chat(chat_id), InputFile::file(path.to_path_buf()));
                if let Some(c) = caption {
                    req = req.caption(c.to_string());
                }
                if let Some(m) = markup.clone() {
                    req = req.reply_markup(m);
                }
                req
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageId> {
        let msg = self
            .with_retry(|| {
                let mut req = self.bot.send_document(
                    Self::tg_chat(chat_id),
                    InputFile::file(path.to_path_buf()),
                );
                if let Some(c) = caption {
                    req = req.caption(c.to_string());
                }
                req
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_media_group(
        &self,
        chat_id: ChatId,
        photos: &[MediaPhoto],
    ) -> Result<Vec<MessageId>> {
        let media: Vec<InputMedia> = photos
            .iter()
            .map(|p| {
                let mut photo = InputMediaPhoto::new(InputFile::file(
                    std::path::PathBuf::from(&p.path),
                ));
                if let Some(c) = &p.caption {
                    photo = photo.caption(c.clone());
                }
                InputMedia::Photo(photo)
            })
            .collect();

        let msgs = self
            .with_retry(|| {
                self.bot
                    .send_media_group(Self::tg_chat(chat_id), media.clone())
            })
            .await?;
        Ok(msgs.into_iter().map(|m| MessageId(m.id.0)).collect())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(chat_id), Self::tg_msg_id(message_id))
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
