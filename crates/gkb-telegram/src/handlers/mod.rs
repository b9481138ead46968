//! Telegram update handlers.
//!
//! Each handler translates a teloxide update into a core inbound event and
//! runs it through the dialogue engine under the chat's lock. Errors stop at
//! this boundary: they are logged and the user gets a generic failure reply
//! so the dispatcher keeps polling.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use gkb_core::menu::texts;

use crate::router::AppState;

mod callback;
mod commands;
mod photo;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let _guard = state.chat_locks.lock_chat(chat_id).await;

    let outcome = if let Some(body) = msg.text() {
        match commands::parse_command(body) {
            Some(cmd) => commands::handle_command(&msg, &state, cmd).await,
            None => text::handle_text(&msg, &state).await,
        }
    } else if msg.photo().is_some() {
        photo::handle_photo(&bot, &msg, &state).await
    } else {
        // Voice, stickers, documents and the rest are not part of any flow.
        Ok(())
    };

    if let Err(e) = outcome {
        tracing::error!(chat_id, "message handler failed: {e}");
        let _ = bot.send_message(msg.chat.id, texts::GENERIC_ERROR).await;
    }
    Ok(())
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat.id.0) else {
        // Inline-mode callbacks carry no chat; nothing to route.
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    let _guard = state.chat_locks.lock_chat(chat_id).await;

    if let Err(e) = callback::handle_callback(&q, chat_id, &state).await {
        tracing::error!(chat_id, "callback handler failed: {e}");
        let _ = bot.answer_callback_query(q.id.clone()).await;
    }
    Ok(())
}
