use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, GuideId, LessonNumber, MessageId};

/// Durable per-chat authorization and bookkeeping record.
///
/// One document per chat, keyed by `chat_id`. Access sets persist across
/// logout, so a returning user keeps previously unlocked resources once they
/// re-authenticate; while `authenticated` is false the sets are never
/// consulted for rendering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub chat_id: ChatId,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub guide_access: BTreeSet<GuideId>,
    #[serde(default)]
    pub lesson_access: BTreeSet<LessonNumber>,
    /// Outbound message ids sent to this chat since the last clear, in send
    /// order. Drained to bulk-delete stale UI messages on login/logout.
    #[serde(default)]
    pub sent_message_ids: Vec<MessageId>,
}

impl Session {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            authenticated: false,
            is_admin: false,
            guide_access: BTreeSet::new(),
            lesson_access: BTreeSet::new(),
            sent_message_ids: Vec::new(),
        }
    }

    /// Whether this chat may see a lesson's content. Admins see everything;
    /// regular users only lessons they unlocked. Unauthenticated sessions see
    /// nothing regardless of what the access set contains.
    pub fn can_view_lesson(&self, lesson: LessonNumber) -> bool {
        self.authenticated && (self.is_admin || self.lesson_access.contains(&lesson))
    }

    /// Guide ids this chat may download, empty while unauthenticated.
    pub fn unlocked_guides(&self) -> Vec<GuideId> {
        if !self.authenticated {
            return Vec::new();
        }
        self.guide_access.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_sets_are_ignored_while_unauthenticated() {
        let mut s = Session::new(ChatId(1));
        s.lesson_access.insert(LessonNumber(7));
        s.guide_access.insert(GuideId("guide1".to_string()));

        assert!(!s.can_view_lesson(LessonNumber(7)));
        assert!(s.unlocked_guides().is_empty());

        s.authenticated = true;
        assert!(s.can_view_lesson(LessonNumber(7)));
        assert!(!s.can_view_lesson(LessonNumber(8)));
        assert_eq!(s.unlocked_guides(), vec![GuideId("guide1".to_string())]);
    }

    #[test]
    fn admin_sees_all_lessons() {
        let mut s = Session::new(ChatId(1));
        s.authenticated = true;
        s.is_admin = true;
        assert!(s.can_view_lesson(LessonNumber(99)));
    }
}
