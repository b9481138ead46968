use teloxide::types::CallbackQuery;

use gkb_core::{dialogue::InboundCallback, domain::ChatId};

use crate::router::AppState;

pub async fn handle_callback(
    q: &CallbackQuery,
    chat_id: i64,
    state: &AppState,
) -> gkb_core::Result<()> {
    // Empty data fails JSON decoding in the engine, which then just answers
    // the query to stop the client spinner.
    let ev = InboundCallback {
        chat_id: ChatId(chat_id),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
    };
    state.engine.handle_callback(ev).await
}
