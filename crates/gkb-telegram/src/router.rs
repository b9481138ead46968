use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use gkb_core::{
    config::Config,
    dialogue::DialogueEngine,
    ports::{CatalogStore, CredentialStore, SessionStore},
};

use crate::{handlers, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<DialogueEngine>,
    pub chat_locks: Arc<ChatLocks>,
}

/// One mutex per chat so updates from the same chat are processed strictly in
/// arrival order. Different chats proceed in parallel.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // A held or pending lock keeps an Arc clone outside the map, so
            // entries at strong count 1 are idle and can be dropped. Without
            // this the map grows by one entry per chat ever seen.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogStore>,
    credentials: Arc<dyn CredentialStore>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = me.username(), "bot started");
    }

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let engine = Arc::new(DialogueEngine::new(
        cfg.clone(),
        sessions,
        catalog,
        credentials,
        messenger,
    ));

    let state = Arc::new(AppState {
        cfg,
        engine,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
