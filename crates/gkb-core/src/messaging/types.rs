use serde::{Deserialize, Serialize};

/// Keyboard attached to an outbound text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Keyboard {
    None,
    Reply(ReplyKeyboard),
    /// Force the client into reply mode so the next message references ours.
    ForceReply,
    Inline(InlineKeyboard),
}

/// Reply keyboard (persistent button rows under the input field).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    pub one_time: bool,
    pub resize: bool,
}

impl ReplyKeyboard {
    /// One button per row, the layout every menu in this bot uses.
    pub fn single_column(labels: &[&str]) -> Self {
        Self {
            rows: labels.iter().map(|l| vec![l.to_string()]).collect(),
            one_time: true,
            resize: true,
        }
    }

    /// All buttons on one row.
    pub fn single_row(labels: &[&str]) -> Self {
        Self {
            rows: vec![labels.iter().map(|l| l.to_string()).collect()],
            one_time: true,
            resize: true,
        }
    }
}

/// Inline keyboard (buttons attached to a message), one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

/// One photo of a media-group send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPhoto {
    pub path: String,
    pub caption: Option<String>,
}

/// Inline-button payload, serialized as JSON into `callback_data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    /// Open a sub-lesson of a lesson.
    SubLesson { lesson: i64, sub: i64 },
    /// Order stub for a merch listing.
    Order { order: String },
}

impl CallbackPayload {
    pub fn encode(&self) -> String {
        // Both variants are flat structs of scalars; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_payload_round_trips_both_variants() {
        let sub = CallbackPayload::SubLesson { lesson: 4, sub: 2 };
        assert_eq!(CallbackPayload::decode(&sub.encode()), Some(sub));

        let order = CallbackPayload::Order {
            order: "Футболка".to_string(),
        };
        assert_eq!(CallbackPayload::decode(&order.encode()), Some(order));

        assert_eq!(CallbackPayload::decode("not json"), None);
    }
}
