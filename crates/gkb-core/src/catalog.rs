use serde::{Deserialize, Serialize};

use crate::domain::LessonNumber;

/// A nested lesson part, reachable via an inline button under the parent
/// lesson's preview.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubLesson {
    pub lesson_number: i64,
    pub title: String,
    pub video_url: String,
}

/// Catalog entry for a video lesson. `lesson_number` is the stable key used
/// for gating, deletion, and per-lesson passwords.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub playlist: String,
    pub lesson_number: LessonNumber,
    pub video_url: String,
    pub description: String,
    pub image_path: Option<String>,
    pub has_sub_lessons: bool,
    #[serde(default)]
    pub sub_lessons: Vec<SubLesson>,
}

/// Catalog entry for a merchandise listing. `name` is the deletion key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Merch {
    pub name: String,
    pub price: f64,
    pub description: String,
    pub images: Vec<String>,
}

impl Merch {
    /// At most this many photos are kept per listing.
    pub const MAX_IMAGES: usize = 3;

    /// Caption shown on the first photo of the listing's media group.
    pub fn caption(&self) -> String {
        format!(
            "{}\nЦена: {}\nОписание: {}",
            self.name, self.price, self.description
        )
    }
}
