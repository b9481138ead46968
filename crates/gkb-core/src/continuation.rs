//! Pending-reply continuations.
//!
//! Several admin workflows span two or three inbound events (button, then a
//! photo, then a structured reply). Correlation is per chat plus, for
//! reply-form steps, the id of the message being replied to. Slots are
//! process-local and in-memory: losing them on restart only means the admin
//! restarts the flow from the menu.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::{
    domain::{ChatId, MessageId},
    errors::Error,
    Result,
};

/// What kind of inbound event resumes an armed slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// Any next text message from the chat.
    NextText,
    /// Any next photo message from the chat.
    NextPhoto,
    /// A text message explicitly replying to the given outbound message.
    ReplyTo(MessageId),
}

/// The suspended workflow step, resumed by the next matching event.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowStep {
    LessonPhoto,
    LessonFields { image_path: String },
    LessonDelete,
    MerchPhoto,
    MerchFields { image_paths: Vec<String> },
    MerchDelete,
    PasswordAdd,
    PasswordRemove,
    ResourcePasswordSet,
    ResourcePasswordRemove,
}

/// Shape of an inbound event, for matching against an armed slot.
#[derive(Clone, Copy, Debug)]
pub enum EventShape {
    Text { reply_to: Option<MessageId> },
    Photo,
}

struct Slot {
    expectation: Expectation,
    step: FlowStep,
    deadline: Instant,
}

impl Slot {
    fn matches(&self, shape: EventShape) -> bool {
        match (self.expectation, shape) {
            (Expectation::NextText, EventShape::Text { .. }) => true,
            (Expectation::NextPhoto, EventShape::Photo) => true,
            (Expectation::ReplyTo(anchor), EventShape::Text { reply_to }) => {
                reply_to == Some(anchor)
            }
            _ => false,
        }
    }
}

/// One continuation slot per chat.
///
/// Explicit slots replace the original design's global one-shot listeners: a
/// second arm for the same chat is rejected instead of silently shadowing the
/// first, and slots expire so an abandoned flow cannot linger forever.
pub struct ContinuationTable {
    ttl: Duration,
    slots: Mutex<HashMap<ChatId, Slot>>,
}

impl ContinuationTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a one-shot continuation. Errors with `Error::Validation`
    /// while a live (non-expired) slot exists for the chat.
    pub async fn arm(&self, chat: ChatId, expectation: Expectation, step: FlowStep) -> Result<()> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        if let Some(existing) = slots.get(&chat) {
            if existing.deadline > now {
                return Err(Error::Validation(
                    "a pending step is already armed for this chat".to_string(),
                ));
            }
        }
        slots.insert(
            chat,
            Slot {
                expectation,
                step,
                deadline: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Whether a live slot exists for the chat.
    pub async fn is_armed(&self, chat: ChatId) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(&chat)
            .map(|s| s.deadline > Instant::now())
            .unwrap_or(false)
    }

    /// Whether a live slot would consume an event of this shape, without
    /// consuming it.
    pub async fn would_match(&self, chat: ChatId, shape: EventShape) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(&chat) else {
            return false;
        };
        if slot.deadline > Instant::now() {
            return slot.matches(shape);
        }
        slots.remove(&chat);
        false
    }

    /// Runs `f` over the live slot, if any, without consuming it.
    pub async fn inspect<T>(
        &self,
        chat: ChatId,
        f: impl FnOnce(&Expectation, &FlowStep) -> T,
    ) -> Option<T> {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(&chat) else {
            return None;
        };
        if slot.deadline > Instant::now() {
            return Some(f(&slot.expectation, &slot.step));
        }
        slots.remove(&chat);
        None
    }

    /// Mutates the live slot's step in place when `f` accepts it. Returns
    /// false when no live slot exists or `f` declined; the slot stays armed
    /// either way.
    pub async fn amend(&self, chat: ChatId, f: impl FnOnce(&mut FlowStep) -> bool) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(&chat) else {
            return false;
        };
        if slot.deadline > Instant::now() {
            return f(&mut slot.step);
        }
        slots.remove(&chat);
        false
    }

    /// Removes and returns the armed step when the event matches. At most one
    /// take succeeds per arm; expired slots behave as absent. A live slot that
    /// does not match the event shape is left armed (e.g. plain text while a
    /// reply to a specific message is expected).
    pub async fn take(&self, chat: ChatId, shape: EventShape) -> Option<FlowStep> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get(&chat)?;
        if slot.deadline <= Instant::now() {
            slots.remove(&chat);
            return None;
        }
        if !slot.matches(shape) {
            return None;
        }
        slots.remove(&chat).map(|s| s.step)
    }

    /// Drops any slot for the chat (logout cancels a pending flow).
    pub async fn clear(&self, chat: ChatId) {
        self.slots.lock().await.remove(&chat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANY_TEXT: EventShape = EventShape::Text { reply_to: None };

    fn table() -> ContinuationTable {
        ContinuationTable::new(Duration::from_secs(600))
    }

    #[tokio::test]
    async fn take_fires_at_most_once() {
        let t = table();
        t.arm(ChatId(1), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap();

        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, Some(FlowStep::PasswordAdd));
        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, None);
    }

    #[tokio::test]
    async fn arm_rejects_overlapping_registration() {
        let t = table();
        t.arm(ChatId(1), Expectation::NextPhoto, FlowStep::LessonPhoto)
            .await
            .unwrap();

        let err = t
            .arm(ChatId(1), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // A different chat is unaffected.
        t.arm(ChatId(2), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reply_slot_only_matches_the_anchored_message() {
        let t = table();
        t.arm(
            ChatId(1),
            Expectation::ReplyTo(MessageId(42)),
            FlowStep::LessonDelete,
        )
        .await
        .unwrap();

        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, None);
        assert_eq!(
            t.take(
                ChatId(1),
                EventShape::Text {
                    reply_to: Some(MessageId(41))
                }
            )
            .await,
            None
        );
        // Non-matching events left the slot armed.
        assert_eq!(
            t.take(
                ChatId(1),
                EventShape::Text {
                    reply_to: Some(MessageId(42))
                }
            )
            .await,
            Some(FlowStep::LessonDelete)
        );
    }

    #[tokio::test]
    async fn photo_slot_ignores_text() {
        let t = table();
        t.arm(ChatId(1), Expectation::NextPhoto, FlowStep::MerchPhoto)
            .await
            .unwrap();

        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, None);
        assert_eq!(
            t.take(ChatId(1), EventShape::Photo).await,
            Some(FlowStep::MerchPhoto)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slots_expire_and_can_be_rearmed() {
        let t = ContinuationTable::new(Duration::from_secs(10));
        t.arm(ChatId(1), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!t.is_armed(ChatId(1)).await);
        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, None);

        // The expired slot no longer blocks a new registration.
        t.arm(ChatId(1), Expectation::NextText, FlowStep::PasswordRemove)
            .await
            .unwrap();
        assert_eq!(
            t.take(ChatId(1), ANY_TEXT).await,
            Some(FlowStep::PasswordRemove)
        );
    }

    #[tokio::test]
    async fn would_match_leaves_the_slot_armed() {
        let t = table();
        t.arm(ChatId(1), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap();

        assert!(t.would_match(ChatId(1), ANY_TEXT).await);
        assert!(!t.would_match(ChatId(1), EventShape::Photo).await);
        assert!(!t.would_match(ChatId(2), ANY_TEXT).await);

        // Still consumable afterwards.
        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, Some(FlowStep::PasswordAdd));
    }

    #[tokio::test]
    async fn amend_mutates_the_armed_step_in_place() {
        let t = table();
        t.arm(
            ChatId(1),
            Expectation::ReplyTo(MessageId(7)),
            FlowStep::MerchFields {
                image_paths: vec!["a".to_string()],
            },
        )
        .await
        .unwrap();

        let accepted = t
            .amend(ChatId(1), |step| {
                if let FlowStep::MerchFields { image_paths } = step {
                    image_paths.push("b".to_string());
                    true
                } else {
                    false
                }
            })
            .await;
        assert!(accepted);
        assert!(!t.amend(ChatId(2), |_| true).await);

        assert_eq!(
            t.take(
                ChatId(1),
                EventShape::Text {
                    reply_to: Some(MessageId(7))
                }
            )
            .await,
            Some(FlowStep::MerchFields {
                image_paths: vec!["a".to_string(), "b".to_string()]
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_slots_are_invisible_to_inspect() {
        let t = ContinuationTable::new(Duration::from_secs(10));
        t.arm(ChatId(1), Expectation::NextPhoto, FlowStep::MerchPhoto)
            .await
            .unwrap();
        assert_eq!(
            t.inspect(ChatId(1), |e, _| matches!(e, Expectation::NextPhoto))
                .await,
            Some(true)
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(t.inspect(ChatId(1), |_, _| ()).await, None);
        assert!(!t.would_match(ChatId(1), EventShape::Photo).await);
    }

    #[tokio::test]
    async fn clear_drops_the_slot() {
        let t = table();
        t.arm(ChatId(1), Expectation::NextText, FlowStep::PasswordAdd)
            .await
            .unwrap();
        t.clear(ChatId(1)).await;
        assert_eq!(t.take(ChatId(1), ANY_TEXT).await, None);
    }
}
