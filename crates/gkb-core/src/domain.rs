use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram chat id (numeric). Primary key for session state.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageId(pub i32);

/// Guide identifier as typed by users, e.g. `guide1`. The whole token is the
/// id; the matching PDF lives at `<guides_dir>/<id>.pdf`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuideId(pub String);

/// Lesson number, the stable catalog key for lessons.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LessonNumber(pub i64);

/// A password-gated resource: one secret per resource, settable by admins.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Guide(GuideId),
    Lesson(LessonNumber),
}

impl ResourceRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceRef::Guide(_) => "guide",
            ResourceRef::Lesson(_) => "lesson",
        }
    }

    /// Storage key for the resource within its kind.
    pub fn id_string(&self) -> String {
        match self {
            ResourceRef::Guide(g) => g.0.clone(),
            ResourceRef::Lesson(n) => n.0.to_string(),
        }
    }
}

/// Shared (non-resource) credential sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharedKind {
    /// Grants regular authenticated status.
    Global,
    /// Grants admin status.
    Admin,
}

impl SharedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SharedKind::Global => "global",
            SharedKind::Admin => "admin",
        }
    }
}

impl fmt::Display for GuideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LessonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
