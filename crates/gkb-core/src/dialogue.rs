//! The dialogue engine: consumes inbound events plus the chat's session and
//! decides outbound actions and session mutations.
//!
//! Routing order for free text is fixed: pending continuation first, then the
//! public merch action, then role-gated menu actions, then the credential
//! chain. The engine only talks to ports so the whole state machine runs
//! against in-memory fakes in tests.

use std::path::Path;
use std::sync::Arc;

use crate::{
    auth::{self, AuthEngine, AuthOutcome},
    catalog::{Lesson, Merch},
    config::Config,
    continuation::{ContinuationTable, EventShape, Expectation, FlowStep},
    domain::{ChatId, LessonNumber, MessageId},
    errors::Error,
    menu::{self, texts, Action, Screen},
    messaging::{
        port::MessagingPort,
        types::{CallbackPayload, InlineButton, InlineKeyboard, Keyboard, MediaPhoto},
    },
    ports::{CatalogStore, CredentialStore, SessionStore},
    session::Session,
    Result,
};

/// Inbound plain-text message (menu button presses included).
#[derive(Clone, Debug)]
pub struct InboundText {
    pub chat_id: ChatId,
    pub text: String,
    /// Set when the message explicitly replies to one of ours.
    pub reply_to: Option<MessageId>,
}

/// Inbound photo message, already downloaded to local storage by the
/// transport layer.
#[derive(Clone, Debug)]
pub struct InboundPhoto {
    pub chat_id: ChatId,
    pub image_paths: Vec<String>,
}

/// Inbound inline-button press.
#[derive(Clone, Debug)]
pub struct InboundCallback {
    pub chat_id: ChatId,
    pub callback_id: String,
    pub data: String,
}

pub struct DialogueEngine {
    cfg: Arc<Config>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn CatalogStore>,
    auth: AuthEngine,
    messenger: Arc<dyn MessagingPort>,
    continuations: ContinuationTable,
}

impl DialogueEngine {
    pub fn new(
        cfg: Arc<Config>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogStore>,
        credentials: Arc<dyn CredentialStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let continuations = ContinuationTable::new(cfg.pending_reply_ttl);
        Self {
            cfg,
            sessions,
            catalog,
            auth: AuthEngine::new(credentials),
            messenger,
            continuations,
        }
    }

    /// `/start`: greet according to the session's role.
    pub async fn handle_start(&self, chat: ChatId) -> Result<()> {
        match self.sessions.get(chat).await? {
            Some(s) if s.authenticated => {
                let text = if s.is_admin {
                    texts::ADMIN_LOGGED_IN
                } else {
                    texts::ALREADY_LOGGED_IN
                };
                self.send_screen(chat, text, Screen::home(s.is_admin)).await
            }
            _ => self.send_screen(chat, texts::WELCOME, Screen::Login).await,
        }
    }

    pub async fn handle_text(&self, ev: InboundText) -> Result<()> {
        let chat = ev.chat_id;
        let text = ev.text.trim().to_string();

        let shape = EventShape::Text {
            reply_to: ev.reply_to,
        };

        // Menu presses never feed a text-expecting step. The slot stays armed
        // and the user is reminded to finish the flow, so pressing a button
        // mid-flow cannot, say, register the button label as a password.
        if Action::from_label(&text).is_some() && self.continuations.would_match(chat, shape).await
        {
            self.send_and_record(chat, texts::FLOW_IN_PROGRESS, Keyboard::None)
                .await?;
            return Ok(());
        }

        if let Some(step) = self.continuations.take(chat, shape).await {
            return self.resume_text_step(chat, step, &text).await;
        }

        // Merch browsing is open to everyone, authenticated or not.
        if Action::from_label(&text) == Some(Action::ShowMerch) {
            return self.show_merch(chat, true).await;
        }

        match self.sessions.get(chat).await? {
            Some(s) if s.authenticated => self.authenticated_text(s, &text).await,
            _ => self.unauthenticated_text(chat, &text).await,
        }
    }

    /// Whether the chat's pending flow can consume a photo right now: either
    /// a photo expectation is armed, or a merch form is still collecting
    /// album images. The transport checks this before downloading anything,
    /// so photos from chats with no armed flow never touch the disk.
    pub async fn awaiting_photo(&self, chat: ChatId) -> bool {
        self.continuations
            .inspect(chat, |expectation, step| {
                matches!(expectation, Expectation::NextPhoto)
                    || matches!(step, FlowStep::MerchFields { image_paths }
                        if image_paths.len() < Merch::MAX_IMAGES)
            })
            .await
            .unwrap_or(false)
    }

    pub async fn handle_photo(&self, ev: InboundPhoto) -> Result<()> {
        let chat = ev.chat_id;
        match self.continuations.take(chat, EventShape::Photo).await {
            Some(FlowStep::LessonPhoto) => {
                let Some(image_path) = ev.image_paths.into_iter().next() else {
                    return Ok(());
                };
                let anchor = self
                    .send_and_record(chat, texts::LESSON_FORM, Keyboard::ForceReply)
                    .await?;
                self.continuations
                    .arm(
                        chat,
                        Expectation::ReplyTo(anchor),
                        FlowStep::LessonFields { image_path },
                    )
                    .await
            }
            Some(FlowStep::MerchPhoto) => {
                let mut image_paths = ev.image_paths;
                image_paths.truncate(Merch::MAX_IMAGES);
                if image_paths.is_empty() {
                    return Ok(());
                }
                let anchor = self
                    .send_and_record(chat, texts::MERCH_FORM, Keyboard::ForceReply)
                    .await?;
                self.continuations
                    .arm(
                        chat,
                        Expectation::ReplyTo(anchor),
                        FlowStep::MerchFields { image_paths },
                    )
                    .await
            }
            Some(other) => {
                tracing::debug!(chat = chat.0, ?other, "photo resumed unexpected step");
                Ok(())
            }
            None => {
                // An album arrives as one message per photo. The first one
                // consumed the photo slot above and armed the merch form;
                // later ones land here and extend the form's image list up to
                // the cap.
                let extra = ev.image_paths;
                let absorbed = self
                    .continuations
                    .amend(chat, move |step| {
                        if let FlowStep::MerchFields { image_paths } = step {
                            for path in extra {
                                if image_paths.len() >= Merch::MAX_IMAGES {
                                    break;
                                }
                                image_paths.push(path);
                            }
                            true
                        } else {
                            false
                        }
                    })
                    .await;
                if !absorbed {
                    tracing::debug!(chat = chat.0, "photo outside any flow, ignored");
                }
                Ok(())
            }
        }
    }

    pub async fn handle_callback(&self, ev: InboundCallback) -> Result<()> {
        let Some(payload) = CallbackPayload::decode(&ev.data) else {
            return self.messenger.answer_callback(&ev.callback_id, None).await;
        };

        match payload {
            CallbackPayload::SubLesson { lesson, sub } => {
                let allowed = self
                    .sessions
                    .get(ev.chat_id)
                    .await?
                    .map(|s| s.can_view_lesson(LessonNumber(lesson)))
                    .unwrap_or(false);
                if !allowed {
                    return self
                        .messenger
                        .answer_callback(&ev.callback_id, Some(texts::NO_ACCESS))
                        .await;
                }

                let found = self
                    .catalog
                    .lesson_by_number(LessonNumber(lesson))
                    .await?
                    .and_then(|l| l.sub_lessons.into_iter().find(|s| s.lesson_number == sub));
                let Some(sub_lesson) = found else {
                    return self.messenger.answer_callback(&ev.callback_id, None).await;
                };

                let text = format!(
                    "Подурок {}: {}\nСмотреть видео: {}",
                    sub_lesson.lesson_number, sub_lesson.title, sub_lesson.video_url
                );
                self.send_and_record(ev.chat_id, &text, Keyboard::None)
                    .await?;
                self.messenger.answer_callback(&ev.callback_id, None).await
            }
            CallbackPayload::Order { order } => {
                // Payment is out of scope; the order flow only confirms.
                tracing::info!(chat = ev.chat_id.0, %order, "order stub confirmed");
                self.send_and_record(ev.chat_id, texts::ORDER_CONFIRMED, Keyboard::None)
                    .await?;
                self.messenger.answer_callback(&ev.callback_id, None).await
            }
        }
    }

    async fn unauthenticated_text(&self, chat: ChatId, text: &str) -> Result<()> {
        if Action::from_label(text) == Some(Action::Login) {
            self.send_and_record(chat, texts::LOGIN_PROMPT, Keyboard::None)
                .await?;
            return Ok(());
        }

        match self.auth.authenticate(text).await? {
            AuthOutcome::Admin => {
                self.purge_ui(chat).await?;
                self.sessions.upsert_authenticated(chat, true).await?;
                self.send_screen(chat, texts::ADMIN_LOGGED_IN, Screen::Admin)
                    .await
            }
            AuthOutcome::Regular => {
                self.purge_ui(chat).await?;
                self.sessions.upsert_authenticated(chat, false).await?;
                self.send_screen(chat, texts::PASSWORD_OK, Screen::Root).await
            }
            AuthOutcome::GuideUnlocked(guide) => {
                self.purge_ui(chat).await?;
                self.sessions.grant_guide_access(chat, &guide).await?;
                self.send_screen(chat, &texts::guide_unlocked(&guide), Screen::Root)
                    .await
            }
            AuthOutcome::LessonUnlocked(lesson) => {
                self.purge_ui(chat).await?;
                self.sessions.grant_lesson_access(chat, lesson).await?;
                self.send_screen(chat, &texts::lesson_unlocked(lesson), Screen::Root)
                    .await
            }
            AuthOutcome::Rejected => {
                self.send_and_record(chat, texts::PASSWORD_WRONG, Keyboard::None)
                    .await?;
                Ok(())
            }
        }
    }

    async fn authenticated_text(&self, session: Session, text: &str) -> Result<()> {
        let chat = session.chat_id;

        let Some(action) = Action::from_label(text) else {
            // Grants accumulate: resource passwords keep working after login,
            // and an admin password elevates a regular session.
            return match self.auth.authenticate(text).await? {
                AuthOutcome::Admin => {
                    self.sessions.upsert_authenticated(chat, true).await?;
                    self.send_screen(chat, texts::ADMIN_LOGGED_IN, Screen::Admin)
                        .await
                }
                AuthOutcome::Regular => {
                    self.sessions.upsert_authenticated(chat, false).await?;
                    self.send_screen(chat, texts::PASSWORD_OK, Screen::Root).await
                }
                AuthOutcome::GuideUnlocked(guide) => {
                    self.sessions.grant_guide_access(chat, &guide).await?;
                    self.send_screen(
                        chat,
                        &texts::guide_unlocked(&guide),
                        Screen::home(session.is_admin),
                    )
                    .await
                }
                AuthOutcome::LessonUnlocked(lesson) => {
                    self.sessions.grant_lesson_access(chat, lesson).await?;
                    self.send_screen(
                        chat,
                        &texts::lesson_unlocked(lesson),
                        Screen::home(session.is_admin),
                    )
                    .await
                }
                AuthOutcome::Rejected => {
                    // Explicit unhandled-input reply, never a silent drop.
                    self.send_and_record(chat, texts::UNRECOGNIZED, Keyboard::None)
                        .await?;
                    Ok(())
                }
            };
        };

        if action.requires_admin() && !session.is_admin {
            self.send_and_record(chat, texts::UNRECOGNIZED, Keyboard::None)
                .await?;
            return Ok(());
        }

        match action {
            Action::Login => {
                let text = if session.is_admin {
                    texts::ADMIN_LOGGED_IN
                } else {
                    texts::ALREADY_LOGGED_IN
                };
                self.send_screen(chat, text, Screen::home(session.is_admin))
                    .await
            }
            Action::Logout => self.logout(chat).await,
            Action::ShowMerch => self.show_merch(chat, true).await,

            Action::VideoCourses => self.show_lessons(&session).await,
            Action::Guides => self.show_guides(&session).await,
            Action::Reviews => {
                self.send_and_record(chat, texts::REVIEWS_TEXT, Keyboard::None)
                    .await?;
                Ok(())
            }
            Action::Help => {
                self.send_and_record(chat, texts::HELP_TEXT, Keyboard::None)
                    .await?;
                Ok(())
            }
            Action::HowTo => {
                self.send_and_record(chat, texts::HOW_TO_TEXT, Keyboard::None)
                    .await?;
                Ok(())
            }

            Action::ManageLessons | Action::ManageMerch | Action::ManagePasswords | Action::Back => {
                // The transition table covers exactly the navigation actions.
                let screen = menu::transition(action)
                    .ok_or_else(|| Error::Validation(format!("not a navigation action: {action:?}")))?;
                let title = match screen {
                    Screen::Admin => texts::CHOOSE_SECTION,
                    _ => texts::CHOOSE_ACTION,
                };
                self.send_screen(chat, title, screen).await
            }

            Action::AddLesson => {
                self.begin_flow(
                    chat,
                    Expectation::NextPhoto,
                    FlowStep::LessonPhoto,
                    texts::SEND_LESSON_PHOTO,
                )
                .await
            }
            Action::DeleteLesson => {
                self.begin_reply_flow(chat, FlowStep::LessonDelete, texts::LESSON_DELETE_PROMPT)
                    .await
            }
            Action::ListLessons => self.show_lessons(&session).await,

            Action::AddMerch => {
                self.begin_flow(
                    chat,
                    Expectation::NextPhoto,
                    FlowStep::MerchPhoto,
                    texts::SEND_MERCH_PHOTOS,
                )
                .await
            }
            Action::DeleteMerch => {
                self.begin_reply_flow(chat, FlowStep::MerchDelete, texts::MERCH_DELETE_PROMPT)
                    .await
            }
            Action::ListMerch => self.show_merch(chat, false).await,

            Action::ShowPasswords => {
                let passwords = self.auth.global_passwords().await?;
                let text = if passwords.is_empty() {
                    texts::PASSWORD_LIST_EMPTY.to_string()
                } else {
                    format!("{}\n{}", texts::PASSWORD_LIST_HEADER, passwords.join("\n"))
                };
                self.send_and_record(chat, &text, Keyboard::None).await?;
                Ok(())
            }
            Action::AddPassword => {
                self.begin_flow(
                    chat,
                    Expectation::NextText,
                    FlowStep::PasswordAdd,
                    texts::PASSWORD_ADD_PROMPT,
                )
                .await
            }
            Action::DeletePassword => {
                self.begin_flow(
                    chat,
                    Expectation::NextText,
                    FlowStep::PasswordRemove,
                    texts::PASSWORD_DELETE_PROMPT,
                )
                .await
            }
            Action::SetResourcePassword => {
                self.begin_flow(
                    chat,
                    Expectation::NextText,
                    FlowStep::ResourcePasswordSet,
                    texts::RESOURCE_PASSWORD_SET_PROMPT,
                )
                .await
            }
            Action::DeleteResourcePassword => {
                self.begin_flow(
                    chat,
                    Expectation::NextText,
                    FlowStep::ResourcePasswordRemove,
                    texts::RESOURCE_PASSWORD_DELETE_PROMPT,
                )
                .await
            }
        }
    }

    /// Runs a consumed continuation step against the reply text. On a
    /// validation failure the user gets a format-error message and the
    /// continuation stays consumed; the flow restarts from the menu.
    async fn resume_text_step(&self, chat: ChatId, step: FlowStep, text: &str) -> Result<()> {
        match step {
            FlowStep::LessonFields { image_path } => {
                match crate::forms::parse_lesson_form(text, &image_path) {
                    Ok(lesson) => {
                        self.catalog.insert_lesson(&lesson).await?;
                        self.send_and_record(chat, texts::LESSON_ADDED, Keyboard::None)
                            .await?;
                    }
                    Err(Error::Validation(reason)) => {
                        tracing::debug!(chat = chat.0, %reason, "lesson form rejected");
                        self.send_and_record(chat, texts::BAD_FORM, Keyboard::None)
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            FlowStep::MerchFields { image_paths } => {
                match crate::forms::parse_merch_form(text, image_paths) {
                    Ok(merch) => {
                        self.catalog.insert_merch(&merch).await?;
                        self.send_and_record(chat, texts::MERCH_ADDED, Keyboard::None)
                            .await?;
                    }
                    Err(Error::Validation(reason)) => {
                        tracing::debug!(chat = chat.0, %reason, "merch form rejected");
                        self.send_and_record(chat, texts::BAD_FORM, Keyboard::None)
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            FlowStep::LessonDelete => {
                let Ok(number) = text.trim().parse::<i64>() else {
                    self.send_and_record(chat, texts::LESSON_BAD_NUMBER, Keyboard::None)
                        .await?;
                    return Ok(());
                };
                let deleted = self.catalog.delete_lesson(LessonNumber(number)).await?;
                let reply = if deleted {
                    texts::LESSON_DELETED
                } else {
                    texts::LESSON_NOT_FOUND
                };
                self.send_and_record(chat, reply, Keyboard::None).await?;
                Ok(())
            }
            FlowStep::MerchDelete => {
                let name = text.trim();
                if name.is_empty() {
                    self.send_and_record(chat, texts::MERCH_BAD_NAME, Keyboard::None)
                        .await?;
                    return Ok(());
                }
                let deleted = self.catalog.delete_merch(name).await?;
                let reply = if deleted {
                    texts::MERCH_DELETED
                } else {
                    texts::MERCH_NOT_FOUND
                };
                self.send_and_record(chat, reply, Keyboard::None).await?;
                Ok(())
            }
            FlowStep::PasswordAdd => {
                self.auth.add_global_password(text).await?;
                self.send_and_record(chat, texts::PASSWORD_ADDED, Keyboard::None)
                    .await?;
                Ok(())
            }
            FlowStep::PasswordRemove => {
                let removed = self.auth.remove_global_password(text).await?;
                let reply = if removed {
                    texts::PASSWORD_DELETED
                } else {
                    texts::PASSWORD_NOT_FOUND
                };
                self.send_and_record(chat, reply, Keyboard::None).await?;
                Ok(())
            }
            FlowStep::ResourcePasswordSet => {
                let Some((resource, secret)) = auth::parse_resource_claim(text) else {
                    self.send_and_record(chat, texts::BAD_RESOURCE, Keyboard::None)
                        .await?;
                    return Ok(());
                };
                self.auth.set_resource_password(&resource, secret).await?;
                self.send_and_record(chat, texts::RESOURCE_PASSWORD_SET, Keyboard::None)
                    .await?;
                Ok(())
            }
            FlowStep::ResourcePasswordRemove => {
                let Some(resource) = auth::parse_resource_ref(text.trim()) else {
                    self.send_and_record(chat, texts::BAD_RESOURCE, Keyboard::None)
                        .await?;
                    return Ok(());
                };
                let removed = self.auth.remove_resource_password(&resource).await?;
                let reply = if removed {
                    texts::RESOURCE_PASSWORD_DELETED
                } else {
                    texts::RESOURCE_PASSWORD_NOT_FOUND
                };
                self.send_and_record(chat, reply, Keyboard::None).await?;
                Ok(())
            }
            // Photo-expectation steps never match a text event.
            FlowStep::LessonPhoto | FlowStep::MerchPhoto => Ok(()),
        }
    }

    async fn logout(&self, chat: ChatId) -> Result<()> {
        self.sessions.set_logged_out(chat).await?;
        self.continuations.clear(chat).await;
        self.purge_ui(chat).await?;
        self.send_screen(chat, texts::LOGGED_OUT, Screen::Login).await
    }

    /// Starts a flow whose next event needs no anchor message.
    async fn begin_flow(
        &self,
        chat: ChatId,
        expectation: Expectation,
        step: FlowStep,
        prompt: &str,
    ) -> Result<()> {
        if self.continuations.is_armed(chat).await {
            self.send_and_record(chat, texts::FLOW_IN_PROGRESS, Keyboard::None)
                .await?;
            return Ok(());
        }
        self.send_and_record(chat, prompt, Keyboard::None).await?;
        self.continuations.arm(chat, expectation, step).await
    }

    /// Starts a flow resumed by a force-reply to the prompt we send here.
    async fn begin_reply_flow(&self, chat: ChatId, step: FlowStep, prompt: &str) -> Result<()> {
        if self.continuations.is_armed(chat).await {
            self.send_and_record(chat, texts::FLOW_IN_PROGRESS, Keyboard::None)
                .await?;
            return Ok(());
        }
        let anchor = self
            .send_and_record(chat, prompt, Keyboard::ForceReply)
            .await?;
        self.continuations
            .arm(chat, Expectation::ReplyTo(anchor), step)
            .await
    }

    async fn show_lessons(&self, session: &Session) -> Result<()> {
        let chat = session.chat_id;
        let lessons = self.catalog.lessons().await?;
        let visible: Vec<Lesson> = lessons
            .into_iter()
            .filter(|l| session.can_view_lesson(l.lesson_number))
            .collect();

        if visible.is_empty() {
            let text = if session.is_admin {
                texts::LESSONS_EMPTY
            } else {
                texts::NO_LESSON_ACCESS
            };
            self.send_and_record(chat, text, Keyboard::None).await?;
            return Ok(());
        }

        for lesson in visible {
            let caption = lesson_caption(&lesson);
            let buttons = sub_lesson_buttons(&lesson);
            let message_id = match &lesson.image_path {
                Some(path) => {
                    self.messenger
                        .send_photo(chat, Path::new(path), Some(&caption), buttons)
                        .await?
                }
                None => {
                    let keyboard = buttons.map(Keyboard::Inline).unwrap_or(Keyboard::None);
                    self.messenger.send_text(chat, &caption, keyboard).await?
                }
            };
            self.sessions.record_sent_message(chat, message_id).await?;
        }
        Ok(())
    }

    async fn show_guides(&self, session: &Session) -> Result<()> {
        let chat = session.chat_id;
        let guides = session.unlocked_guides();
        if guides.is_empty() {
            self.send_and_record(chat, texts::NO_GUIDE_ACCESS, Keyboard::None)
                .await?;
            return Ok(());
        }

        for guide in guides {
            let path = self.cfg.guide_path(&guide);
            if !path.exists() {
                tracing::warn!(%guide, path = %path.display(), "guide file missing");
                self.send_and_record(chat, &texts::guide_unavailable(&guide), Keyboard::None)
                    .await?;
                continue;
            }
            let message_id = self
                .messenger
                .send_document(chat, &path, Some(&guide.0))
                .await?;
            self.sessions.record_sent_message(chat, message_id).await?;
        }
        Ok(())
    }

    async fn show_merch(&self, chat: ChatId, include_order: bool) -> Result<()> {
        let merches = self.catalog.merch().await?;
        if merches.is_empty() {
            self.send_and_record(chat, texts::MERCH_EMPTY, Keyboard::None)
                .await?;
            return Ok(());
        }

        for merch in &merches {
            if merch.images.is_empty() {
                let message_id = self
                    .messenger
                    .send_text(chat, &merch.caption(), Keyboard::None)
                    .await?;
                self.sessions.record_sent_message(chat, message_id).await?;
                continue;
            }

            let photos: Vec<MediaPhoto> = merch
                .images
                .iter()
                .enumerate()
                .map(|(i, path)| MediaPhoto {
                    path: path.clone(),
                    caption: (i == 0).then(|| merch.caption()),
                })
                .collect();
            let ids = self.messenger.send_media_group(chat, &photos).await?;
            for message_id in ids {
                self.sessions.record_sent_message(chat, message_id).await?;
            }
        }

        if include_order {
            let buttons = merches
                .iter()
                .map(|m| InlineButton {
                    label: m.name.clone(),
                    callback_data: CallbackPayload::Order {
                        order: m.name.clone(),
                    }
                    .encode(),
                })
                .collect();
            self.send_and_record(
                chat,
                texts::ORDER_HINT,
                Keyboard::Inline(InlineKeyboard { buttons }),
            )
            .await?;
        }
        Ok(())
    }

    /// Drains the sent-message buffer and deletes the stale UI messages.
    async fn purge_ui(&self, chat: ChatId) -> Result<()> {
        let stale = self.sessions.clear_sent_messages(chat).await?;
        for message_id in stale {
            // Old UI may already be gone; deletion is best-effort.
            if let Err(e) = self.messenger.delete_message(chat, message_id).await {
                tracing::debug!(chat = chat.0, "failed to delete stale message: {e}");
            }
        }
        Ok(())
    }

    async fn send_screen(&self, chat: ChatId, text: &str, screen: Screen) -> Result<()> {
        self.send_and_record(chat, text, Keyboard::Reply(screen.keyboard()))
            .await?;
        Ok(())
    }

    /// Sends a text message and records its id before returning, so the id is
    /// durable before the next inbound event from this chat (the router holds
    /// the per-chat lock while we are here).
    async fn send_and_record(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Keyboard,
    ) -> Result<MessageId> {
        let message_id = self.messenger.send_text(chat, text, keyboard).await?;
        self.sessions.record_sent_message(chat, message_id).await?;
        Ok(message_id)
    }
}

fn lesson_caption(lesson: &Lesson) -> String {
    format!(
        "Урок {}: {}\nСмотреть видео: {}",
        lesson.lesson_number, lesson.description, lesson.video_url
    )
}

fn sub_lesson_buttons(lesson: &Lesson) -> Option<InlineKeyboard> {
    if lesson.sub_lessons.is_empty() {
        return None;
    }
    let buttons = lesson
        .sub_lessons
        .iter()
        .map(|s| InlineButton {
            label: s.title.clone(),
            callback_data: CallbackPayload::SubLesson {
                lesson: lesson.lesson_number.0,
                sub: s.lesson_number,
            }
            .encode(),
        })
        .collect();
    Some(InlineKeyboard { buttons })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::MemoryCredentialStore;
    use crate::catalog::SubLesson;
    use crate::domain::{GuideId, ResourceRef, SharedKind};
    use crate::menu::labels;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySessionStore {
        inner: Mutex<HashMap<ChatId, Session>>,
    }

    impl MemorySessionStore {
        fn seed(&self, session: Session) {
            self.inner.lock().unwrap().insert(session.chat_id, session);
        }

        fn session(&self, chat: ChatId) -> Option<Session> {
            self.inner.lock().unwrap().get(&chat).cloned()
        }
    }

    #[async_trait]
    impl SessionStore for MemorySessionStore {
        async fn get(&self, chat: ChatId) -> Result<Option<Session>> {
            Ok(self.session(chat))
        }

        async fn upsert_authenticated(&self, chat: ChatId, admin: bool) -> Result<Session> {
            let mut inner = self.inner.lock().unwrap();
            let s = inner.entry(chat).or_insert_with(|| Session::new(chat));
            s.authenticated = true;
            s.is_admin = admin;
            Ok(s.clone())
        }

        async fn set_logged_out(&self, chat: ChatId) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(s) = inner.get_mut(&chat) {
                s.authenticated = false;
                s.is_admin = false;
            }
            Ok(())
        }

        async fn grant_guide_access(&self, chat: ChatId, guide: &GuideId) -> Result<Session> {
            let mut inner = self.inner.lock().unwrap();
            let s = inner.entry(chat).or_insert_with(|| Session::new(chat));
            s.authenticated = true;
            s.guide_access.insert(guide.clone());
            Ok(s.clone())
        }

        async fn grant_lesson_access(&self, chat: ChatId, lesson: LessonNumber) -> Result<Session> {
            let mut inner = self.inner.lock().unwrap();
            let s = inner.entry(chat).or_insert_with(|| Session::new(chat));
            s.authenticated = true;
            s.lesson_access.insert(lesson);
            Ok(s.clone())
        }

        async fn record_sent_message(&self, chat: ChatId, message: MessageId) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            // No-op for chats without a session record, as in the real store.
            if let Some(s) = inner.get_mut(&chat) {
                s.sent_message_ids.push(message);
            }
            Ok(())
        }

        async fn clear_sent_messages(&self, chat: ChatId) -> Result<Vec<MessageId>> {
            let mut inner = self.inner.lock().unwrap();
            Ok(inner
                .get_mut(&chat)
                .map(|s| std::mem::take(&mut s.sent_message_ids))
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct MemoryCatalog {
        lessons: Mutex<Vec<Lesson>>,
        merch: Mutex<Vec<Merch>>,
    }

    #[async_trait]
    impl CatalogStore for MemoryCatalog {
        async fn lessons(&self) -> Result<Vec<Lesson>> {
            let mut all = self.lessons.lock().unwrap().clone();
            all.sort_by_key(|l| l.lesson_number);
            Ok(all)
        }

        async fn lesson_by_number(&self, number: LessonNumber) -> Result<Option<Lesson>> {
            Ok(self
                .lessons
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.lesson_number == number)
                .cloned())
        }

        async fn insert_lesson(&self, lesson: &Lesson) -> Result<()> {
            self.lessons.lock().unwrap().push(lesson.clone());
            Ok(())
        }

        async fn delete_lesson(&self, number: LessonNumber) -> Result<bool> {
            let mut lessons = self.lessons.lock().unwrap();
            let before = lessons.len();
            lessons.retain(|l| l.lesson_number != number);
            Ok(lessons.len() < before)
        }

        async fn merch(&self) -> Result<Vec<Merch>> {
            Ok(self.merch.lock().unwrap().clone())
        }

        async fn insert_merch(&self, merch: &Merch) -> Result<()> {
            self.merch.lock().unwrap().push(merch.clone());
            Ok(())
        }

        async fn delete_merch(&self, name: &str) -> Result<bool> {
            let mut merch = self.merch.lock().unwrap();
            let before = merch.len();
            merch.retain(|m| m.name != name);
            Ok(merch.len() < before)
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Sent {
        Text { text: String, keyboard: Keyboard },
        Photo { path: String },
        Document { path: String },
        MediaGroup { count: usize },
    }

    #[derive(Default)]
    struct RecordingMessenger {
        next_id: Mutex<i32>,
        sent: Mutex<Vec<Sent>>,
        deleted: Mutex<Vec<MessageId>>,
        answered: Mutex<Vec<Option<String>>>,
    }

    impl RecordingMessenger {
        fn alloc(&self) -> MessageId {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            MessageId(*id)
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn last_text(&self) -> Option<(String, Keyboard)> {
            self.sent()
                .into_iter()
                .rev()
                .find_map(|s| match s {
                    Sent::Text { text, keyboard } => Some((text, keyboard)),
                    _ => None,
                })
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn deleted(&self) -> Vec<MessageId> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_text(
            &self,
            _chat_id: ChatId,
            text: &str,
            keyboard: Keyboard,
        ) -> Result<MessageId> {
            self.sent.lock().unwrap().push(Sent::Text {
                text: text.to_string(),
                keyboard,
            });
            Ok(self.alloc())
        }

        async fn send_photo(
            &self,
            _chat_id: ChatId,
            path: &Path,
            _caption: Option<&str>,
            _buttons: Option<InlineKeyboard>,
        ) -> Result<MessageId> {
            self.sent.lock().unwrap().push(Sent::Photo {
                path: path.to_string_lossy().to_string(),
            });
            Ok(self.alloc())
        }

        async fn send_document(
            &self,
            _chat_id: ChatId,
            path: &Path,
            _caption: Option<&str>,
        ) -> Result<MessageId> {
            self.sent.lock().unwrap().push(Sent::Document {
                path: path.to_string_lossy().to_string(),
            });
            Ok(self.alloc())
        }

        async fn send_media_group(
            &self,
            _chat_id: ChatId,
            photos: &[MediaPhoto],
        ) -> Result<Vec<MessageId>> {
            self.sent.lock().unwrap().push(Sent::MediaGroup {
                count: photos.len(),
            });
            Ok(photos.iter().map(|_| self.alloc()).collect())
        }

        async fn delete_message(&self, _chat_id: ChatId, message_id: MessageId) -> Result<()> {
            self.deleted.lock().unwrap().push(message_id);
            Ok(())
        }

        async fn answer_callback(&self, _callback_id: &str, text: Option<&str>) -> Result<()> {
            self.answered
                .lock()
                .unwrap()
                .push(text.map(|t| t.to_string()));
            Ok(())
        }
    }

    struct Harness {
        engine: DialogueEngine,
        sessions: Arc<MemorySessionStore>,
        catalog: Arc<MemoryCatalog>,
        credentials: Arc<MemoryCredentialStore>,
        messenger: Arc<RecordingMessenger>,
    }

    fn harness(credentials: MemoryCredentialStore) -> Harness {
        let cfg = Arc::new(Config {
            bot_token: "test".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "test".to_string(),
            images_dir: "/tmp".into(),
            guides_dir: "/tmp".into(),
            pending_reply_ttl: Duration::from_secs(600),
        });
        let sessions = Arc::new(MemorySessionStore::default());
        let catalog = Arc::new(MemoryCatalog::default());
        let credentials = Arc::new(credentials);
        let messenger = Arc::new(RecordingMessenger::default());
        let engine = DialogueEngine::new(
            cfg,
            sessions.clone(),
            catalog.clone(),
            credentials.clone(),
            messenger.clone(),
        );
        Harness {
            engine,
            sessions,
            catalog,
            credentials,
            messenger,
        }
    }

    fn text_event(chat: i64, text: &str) -> InboundText {
        InboundText {
            chat_id: ChatId(chat),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn reply_event(chat: i64, text: &str, anchor: MessageId) -> InboundText {
        InboundText {
            chat_id: ChatId(chat),
            text: text.to_string(),
            reply_to: Some(anchor),
        }
    }

    async fn login_admin(h: &Harness, chat: i64) {
        h.engine
            .handle_text(text_event(chat, "adminSecret123"))
            .await
            .unwrap();
        let s = h.sessions.session(ChatId(chat)).unwrap();
        assert!(s.authenticated && s.is_admin);
    }

    fn admin_creds() -> MemoryCredentialStore {
        MemoryCredentialStore::with_shared(&[(SharedKind::Admin, "adminSecret123")])
    }

    #[tokio::test]
    async fn admin_password_yields_admin_session_and_menu() {
        let h = harness(admin_creds());
        h.engine
            .handle_text(text_event(1, "adminSecret123"))
            .await
            .unwrap();

        let s = h.sessions.session(ChatId(1)).unwrap();
        assert!(s.authenticated);
        assert!(s.is_admin);

        let (text, keyboard) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::ADMIN_LOGGED_IN);
        match keyboard {
            Keyboard::Reply(k) => {
                assert!(k.rows.iter().any(|r| r.contains(&labels::MANAGE_LESSONS.to_string())))
            }
            other => panic!("expected admin reply keyboard, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn guide_password_grants_guide_access() {
        let creds = MemoryCredentialStore::default();
        let guide = ResourceRef::Guide(GuideId("guide1".to_string()));
        creds.set_resource_secret(&guide, "2323").await.unwrap();

        let h = harness(creds);
        h.engine
            .handle_text(text_event(5, "guide1 2323"))
            .await
            .unwrap();

        let s = h.sessions.session(ChatId(5)).unwrap();
        assert!(s.authenticated);
        assert!(!s.is_admin);
        assert!(s.guide_access.contains(&GuideId("guide1".to_string())));

        let (text, keyboard) = h.messenger.last_text().unwrap();
        assert!(text.contains("guide1"));
        match keyboard {
            Keyboard::Reply(k) => {
                assert!(k.rows.iter().any(|r| r.contains(&labels::GUIDES.to_string())))
            }
            other => panic!("expected root keyboard, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_lesson_password_leaves_session_untouched() {
        let creds = MemoryCredentialStore::default();
        creds
            .set_resource_secret(&ResourceRef::Lesson(LessonNumber(7)), "right")
            .await
            .unwrap();

        let h = harness(creds);
        h.engine
            .handle_text(text_event(5, "lesson7 wrongpass"))
            .await
            .unwrap();

        assert!(h.sessions.session(ChatId(5)).is_none());
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::PASSWORD_WRONG);
    }

    #[tokio::test]
    async fn logout_resets_flags_but_keeps_access_sets() {
        let creds = MemoryCredentialStore::default();
        creds
            .set_resource_secret(&ResourceRef::Lesson(LessonNumber(7)), "pw")
            .await
            .unwrap();

        let h = harness(creds);
        h.engine.handle_text(text_event(5, "lesson7 pw")).await.unwrap();
        h.engine
            .handle_text(text_event(5, labels::LOGOUT))
            .await
            .unwrap();

        let s = h.sessions.session(ChatId(5)).unwrap();
        assert!(!s.authenticated);
        assert!(!s.is_admin);
        assert!(s.lesson_access.contains(&LessonNumber(7)));
    }

    #[tokio::test]
    async fn lesson_grant_is_idempotent() {
        let creds = MemoryCredentialStore::default();
        creds
            .set_resource_secret(&ResourceRef::Lesson(LessonNumber(7)), "pw")
            .await
            .unwrap();

        let h = harness(creds);
        h.engine.handle_text(text_event(5, "lesson7 pw")).await.unwrap();
        h.engine.handle_text(text_event(5, "lesson7 pw")).await.unwrap();

        let s = h.sessions.session(ChatId(5)).unwrap();
        assert_eq!(s.lesson_access.len(), 1);
    }

    #[tokio::test]
    async fn add_lesson_flow_happy_path() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_LESSON))
            .await
            .unwrap();
        let (prompt, _) = h.messenger.last_text().unwrap();
        assert_eq!(prompt, texts::SEND_LESSON_PHOTO);

        h.engine
            .handle_photo(InboundPhoto {
                chat_id: ChatId(1),
                image_paths: vec!["/tmp/preview.jpg".to_string()],
            })
            .await
            .unwrap();
        let (form_prompt, keyboard) = h.messenger.last_text().unwrap();
        assert_eq!(form_prompt, texts::LESSON_FORM);
        assert_eq!(keyboard, Keyboard::ForceReply);

        // The form prompt's id is the reply anchor.
        let anchor = MessageId(*h.messenger.next_id.lock().unwrap());
        h.engine
            .handle_text(reply_event(
                1,
                "1) Основы\n2) 4\n3) https://v.example/4\n4) Стойки\n5) нет",
                anchor,
            ))
            .await
            .unwrap();

        let lessons = h.catalog.lessons.lock().unwrap().clone();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].lesson_number, LessonNumber(4));
        assert_eq!(lessons[0].image_path.as_deref(), Some("/tmp/preview.jpg"));

        let (done, _) = h.messenger.last_text().unwrap();
        assert_eq!(done, texts::LESSON_ADDED);
    }

    #[tokio::test]
    async fn add_lesson_four_fields_fails_and_consumes_continuation() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_LESSON))
            .await
            .unwrap();
        h.engine
            .handle_photo(InboundPhoto {
                chat_id: ChatId(1),
                image_paths: vec!["/tmp/preview.jpg".to_string()],
            })
            .await
            .unwrap();

        let anchor = MessageId(*h.messenger.next_id.lock().unwrap());
        let four_fields = "1) Основы\n2) 4\n3) https://v.example/4\n4) Стойки";
        h.engine
            .handle_text(reply_event(1, four_fields, anchor))
            .await
            .unwrap();

        assert!(h.catalog.lessons.lock().unwrap().is_empty());
        let (err_text, _) = h.messenger.last_text().unwrap();
        assert_eq!(err_text, texts::BAD_FORM);

        // The continuation is consumed: the same reply now falls through to
        // ordinary routing instead of re-running the lesson handler.
        h.engine
            .handle_text(reply_event(1, four_fields, anchor))
            .await
            .unwrap();
        assert!(h.catalog.lessons.lock().unwrap().is_empty());
        let (after, _) = h.messenger.last_text().unwrap();
        assert_eq!(after, texts::UNRECOGNIZED);
    }

    #[tokio::test]
    async fn second_flow_is_rejected_while_one_is_pending() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_LESSON))
            .await
            .unwrap();
        h.engine
            .handle_text(text_event(1, labels::ADD_PASSWORD))
            .await
            .unwrap();

        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::FLOW_IN_PROGRESS);

        // The original photo expectation is still armed.
        h.engine
            .handle_photo(InboundPhoto {
                chat_id: ChatId(1),
                image_paths: vec!["/tmp/p.jpg".to_string()],
            })
            .await
            .unwrap();
        let (form, _) = h.messenger.last_text().unwrap();
        assert_eq!(form, texts::LESSON_FORM);
    }

    #[tokio::test]
    async fn menu_press_does_not_feed_a_text_flow() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_PASSWORD))
            .await
            .unwrap();
        h.engine
            .handle_text(text_event(1, labels::BACK))
            .await
            .unwrap();

        // The button label was not stored as a password.
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::FLOW_IN_PROGRESS);
        let globals = h.credentials.shared_secrets(SharedKind::Global).await.unwrap();
        assert!(globals.is_empty());

        // The slot is still armed and takes the next real secret.
        h.engine
            .handle_text(text_event(1, "npw-2024"))
            .await
            .unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::PASSWORD_ADDED);
        let globals = h.credentials.shared_secrets(SharedKind::Global).await.unwrap();
        assert_eq!(globals, vec!["npw-2024".to_string()]);
    }

    #[tokio::test]
    async fn merch_album_photos_accumulate_up_to_the_cap() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_MERCH))
            .await
            .unwrap();
        assert!(h.engine.awaiting_photo(ChatId(1)).await);

        // An album is delivered as one message per photo; the fourth one is
        // over the cap and dropped.
        for path in ["/tmp/a.jpg", "/tmp/b.jpg", "/tmp/c.jpg", "/tmp/d.jpg"] {
            h.engine
                .handle_photo(InboundPhoto {
                    chat_id: ChatId(1),
                    image_paths: vec![path.to_string()],
                })
                .await
                .unwrap();
        }
        assert!(!h.engine.awaiting_photo(ChatId(1)).await);

        let anchor = MessageId(*h.messenger.next_id.lock().unwrap());
        h.engine
            .handle_text(reply_event(1, "1) Футболка\n2) 2000\n3) Хлопок", anchor))
            .await
            .unwrap();

        let merch = h.catalog.merch.lock().unwrap().clone();
        assert_eq!(merch.len(), 1);
        assert_eq!(
            merch[0].images,
            vec![
                "/tmp/a.jpg".to_string(),
                "/tmp/b.jpg".to_string(),
                "/tmp/c.jpg".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn photos_are_only_awaited_inside_an_armed_flow() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;
        assert!(!h.engine.awaiting_photo(ChatId(1)).await);

        h.engine
            .handle_text(text_event(1, labels::ADD_LESSON))
            .await
            .unwrap();
        assert!(h.engine.awaiting_photo(ChatId(1)).await);

        h.engine
            .handle_photo(InboundPhoto {
                chat_id: ChatId(1),
                image_paths: vec!["/tmp/preview.jpg".to_string()],
            })
            .await
            .unwrap();
        // The lesson flow now waits for the text form, not more photos.
        assert!(!h.engine.awaiting_photo(ChatId(1)).await);

        // Other chats were never waiting.
        assert!(!h.engine.awaiting_photo(ChatId(2)).await);
    }

    #[tokio::test]
    async fn delete_lesson_reports_not_found() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::DELETE_LESSON))
            .await
            .unwrap();
        let anchor = MessageId(*h.messenger.next_id.lock().unwrap());
        h.engine
            .handle_text(reply_event(1, "99", anchor))
            .await
            .unwrap();

        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::LESSON_NOT_FOUND);
    }

    #[tokio::test]
    async fn password_add_flow_feeds_the_credential_chain() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::ADD_PASSWORD))
            .await
            .unwrap();
        h.engine
            .handle_text(text_event(1, "brand-new-pw"))
            .await
            .unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::PASSWORD_ADDED);

        // Another chat can now log in with the new global password.
        h.engine
            .handle_text(text_event(2, "brand-new-pw"))
            .await
            .unwrap();
        let s = h.sessions.session(ChatId(2)).unwrap();
        assert!(s.authenticated);
        assert!(!s.is_admin);
    }

    #[tokio::test]
    async fn resource_password_set_flow_enables_unlock() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::SET_RESOURCE_PASSWORD))
            .await
            .unwrap();
        h.engine
            .handle_text(text_event(1, "guide2 s3cret"))
            .await
            .unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::RESOURCE_PASSWORD_SET);

        h.engine
            .handle_text(text_event(9, "guide2 s3cret"))
            .await
            .unwrap();
        let s = h.sessions.session(ChatId(9)).unwrap();
        assert!(s.guide_access.contains(&GuideId("guide2".to_string())));
    }

    #[tokio::test]
    async fn removing_missing_resource_password_reports_not_found() {
        let h = harness(admin_creds());
        login_admin(&h, 1).await;

        h.engine
            .handle_text(text_event(1, labels::DELETE_RESOURCE_PASSWORD))
            .await
            .unwrap();
        h.engine.handle_text(text_event(1, "guide9")).await.unwrap();

        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::RESOURCE_PASSWORD_NOT_FOUND);
    }

    #[tokio::test]
    async fn merch_listing_is_public_and_ends_with_order_stub() {
        let h = harness(MemoryCredentialStore::default());
        h.catalog.merch.lock().unwrap().push(Merch {
            name: "Футболка".to_string(),
            price: 2000.0,
            description: "Хлопок".to_string(),
            images: vec!["/tmp/a.jpg".to_string(), "/tmp/b.jpg".to_string()],
        });

        h.engine
            .handle_text(text_event(3, labels::MERCH))
            .await
            .unwrap();

        let sent = h.messenger.sent();
        assert!(sent.contains(&Sent::MediaGroup { count: 2 }));
        let (hint, keyboard) = h.messenger.last_text().unwrap();
        assert_eq!(hint, texts::ORDER_HINT);
        assert!(matches!(keyboard, Keyboard::Inline(_)));
    }

    #[tokio::test]
    async fn order_callback_sends_confirmation_stub() {
        let h = harness(MemoryCredentialStore::default());
        let data = CallbackPayload::Order {
            order: "Футболка".to_string(),
        }
        .encode();

        h.engine
            .handle_callback(InboundCallback {
                chat_id: ChatId(3),
                callback_id: "cb1".to_string(),
                data,
            })
            .await
            .unwrap();

        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::ORDER_CONFIRMED);
        assert_eq!(h.messenger.answered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sub_lesson_callback_requires_access() {
        let h = harness(MemoryCredentialStore::default());
        h.catalog.lessons.lock().unwrap().push(Lesson {
            playlist: "Основы".to_string(),
            lesson_number: LessonNumber(4),
            video_url: "https://v.example/4".to_string(),
            description: "Стойки".to_string(),
            image_path: None,
            has_sub_lessons: true,
            sub_lessons: vec![SubLesson {
                lesson_number: 1,
                title: "Разбор".to_string(),
                video_url: "https://v.example/4-1".to_string(),
            }],
        });
        let data = CallbackPayload::SubLesson { lesson: 4, sub: 1 }.encode();

        // No session: denied.
        h.engine
            .handle_callback(InboundCallback {
                chat_id: ChatId(5),
                callback_id: "cb1".to_string(),
                data: data.clone(),
            })
            .await
            .unwrap();
        assert_eq!(
            h.messenger.answered.lock().unwrap().last().cloned().flatten(),
            Some(texts::NO_ACCESS.to_string())
        );

        // Unlock the lesson, then the sub-lesson link goes out.
        h.sessions.seed({
            let mut s = Session::new(ChatId(5));
            s.authenticated = true;
            s.lesson_access.insert(LessonNumber(4));
            s
        });
        h.engine
            .handle_callback(InboundCallback {
                chat_id: ChatId(5),
                callback_id: "cb2".to_string(),
                data,
            })
            .await
            .unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert!(text.contains("https://v.example/4-1"));
    }

    #[tokio::test]
    async fn lessons_screen_shows_only_unlocked_lessons() {
        let h = harness(MemoryCredentialStore::default());
        for n in [4, 5] {
            h.catalog.lessons.lock().unwrap().push(Lesson {
                playlist: "Основы".to_string(),
                lesson_number: LessonNumber(n),
                video_url: format!("https://v.example/{n}"),
                description: format!("Урок номер {n}"),
                image_path: None,
                has_sub_lessons: false,
                sub_lessons: Vec::new(),
            });
        }
        h.sessions.seed({
            let mut s = Session::new(ChatId(5));
            s.authenticated = true;
            s.lesson_access.insert(LessonNumber(4));
            s
        });

        h.engine
            .handle_text(text_event(5, labels::VIDEO_COURSES))
            .await
            .unwrap();

        let texts_sent = h.messenger.texts();
        assert!(texts_sent.iter().any(|t| t.contains("https://v.example/4")));
        assert!(!texts_sent.iter().any(|t| t.contains("https://v.example/5")));
    }

    #[tokio::test]
    async fn login_purges_previously_sent_ui_messages() {
        let h = harness(MemoryCredentialStore::with_shared(&[(
            SharedKind::Global,
            "pw1",
        )]));
        h.sessions.seed({
            let mut s = Session::new(ChatId(5));
            s.sent_message_ids = vec![MessageId(10), MessageId(11)];
            s
        });

        h.engine.handle_text(text_event(5, "pw1")).await.unwrap();

        assert_eq!(h.messenger.deleted(), vec![MessageId(10), MessageId(11)]);
        let s = h.sessions.session(ChatId(5)).unwrap();
        // Only the fresh menu message remains recorded.
        assert_eq!(s.sent_message_ids.len(), 1);
    }

    #[tokio::test]
    async fn regular_user_cannot_trigger_admin_actions() {
        let h = harness(MemoryCredentialStore::with_shared(&[(
            SharedKind::Global,
            "pw1",
        )]));
        h.engine.handle_text(text_event(5, "pw1")).await.unwrap();

        h.engine
            .handle_text(text_event(5, labels::ADD_LESSON))
            .await
            .unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::UNRECOGNIZED);
    }

    #[tokio::test]
    async fn start_greets_by_role() {
        let h = harness(admin_creds());

        h.engine.handle_start(ChatId(1)).await.unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::WELCOME);

        login_admin(&h, 1).await;
        h.engine.handle_start(ChatId(1)).await.unwrap();
        let (text, _) = h.messenger.last_text().unwrap();
        assert_eq!(text, texts::ADMIN_LOGGED_IN);
    }
}
