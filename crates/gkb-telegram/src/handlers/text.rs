use teloxide::types::Message;

use gkb_core::{
    dialogue::InboundText,
    domain::{ChatId, MessageId},
};

use crate::router::AppState;

pub async fn handle_text(msg: &Message, state: &AppState) -> gkb_core::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let ev = InboundText {
        chat_id: ChatId(msg.chat.id.0),
        text: text.to_string(),
        reply_to: msg.reply_to_message().map(|m| MessageId(m.id.0)),
    };
    state.engine.handle_text(ev).await
}
