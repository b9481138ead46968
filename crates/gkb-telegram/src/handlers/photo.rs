use std::sync::atomic::{AtomicUsize, Ordering};

use teloxide::{net::Download, prelude::*, types::PhotoSize};

use gkb_core::{
    dialogue::InboundPhoto,
    domain::ChatId,
    errors::Error,
};

use crate::router::AppState;

static PHOTO_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Downloads the largest rendition into the configured images directory and
/// returns its local path.
async fn download_photo(
    bot: &Bot,
    state: &AppState,
    photos: &[PhotoSize],
) -> gkb_core::Result<String> {
    let best = photos
        .last()
        .ok_or_else(|| Error::Transport("photo message without sizes".to_string()))?;
    let file = bot
        .get_file(best.file.id.clone())
        .await
        .map_err(|e| Error::Transport(format!("get_file: {e}")))?;

    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = PHOTO_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = state.cfg.images_dir.join(format!("photo_{ts}_{n}.jpg"));

    let mut dst = tokio::fs::File::create(&path).await?;
    bot.download_file(&file.path, &mut dst)
        .await
        .map_err(|e| Error::Transport(format!("download: {e}")))?;

    Ok(path.to_string_lossy().to_string())
}

pub async fn handle_photo(bot: &Bot, msg: &Message, state: &AppState) -> gkb_core::Result<()> {
    let Some(photos) = msg.photo() else {
        return Ok(());
    };
    let chat_id = ChatId(msg.chat.id.0);

    // Download only when a flow is waiting for a photo; otherwise any chat
    // could fill the images directory by spamming photos.
    if !state.engine.awaiting_photo(chat_id).await {
        tracing::debug!(chat = chat_id.0, "photo outside any flow, not downloaded");
        return Ok(());
    }

    let path = download_photo(bot, state, photos).await?;
    state
        .engine
        .handle_photo(InboundPhoto {
            chat_id,
            image_paths: vec![path],
        })
        .await
}
