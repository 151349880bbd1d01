use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PreferenceType;
use crate::ingest::types::ContentItem;

/// Author preferences learn at half the rate of topic and source.
pub const AUTHOR_WEIGHT: f32 = 0.5;

/// User action on a digest item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Like,
    Save,
    Click,
    Share,
    View,
    Dislike,
    Skip,
    Hide,
    Report,
}

impl FeedbackAction {
    /// `Some(true)` for positive, `Some(false)` for negative, `None` when the
    /// action carries no preference signal.
    pub fn polarity(self) -> Option<bool> {
        match self {
            Self::Like | Self::Save | Self::Click | Self::Share => Some(true),
            Self::Dislike | Self::Skip | Self::Hide | Self::Report => Some(false),
            Self::View => None,
        }
    }
}

impl FromStr for FeedbackAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "save" => Ok(Self::Save),
            "click" => Ok(Self::Click),
            "share" => Ok(Self::Share),
            "view" => Ok(Self::View),
            "dislike" => Ok(Self::Dislike),
            "skip" => Ok(Self::Skip),
            "hide" => Ok(Self::Hide),
            "report" => Ok(Self::Report),
            other => Err(format!("unknown feedback action `{other}`")),
        }
    }
}

/// One preference write derived from a feedback event.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub kind: PreferenceType,
    pub key: String,
    pub weight: f32,
}

/// Preference keys touched by feedback on `item`: every topic, the source,
/// and the author when known. Topics repeated on the item count once.
pub fn interactions_for(item: &ContentItem) -> Vec<Interaction> {
    let mut out: Vec<Interaction> = Vec::with_capacity(item.topics.len() + 2);
    for name in item.topic_names() {
        let name = name.trim();
        if name.is_empty() || out.iter().any(|i| i.key == name) {
            continue;
        }
        out.push(Interaction {
            kind: PreferenceType::Topic,
            key: name.to_string(),
            weight: 1.0,
        });
    }
    out.push(Interaction {
        kind: PreferenceType::Source,
        key: item.source_id.clone(),
        weight: 1.0,
    });
    if let Some(author) = &item.author {
        out.push(Interaction {
            kind: PreferenceType::Author,
            key: author.clone(),
            weight: AUTHOR_WEIGHT,
        });
    }
    out
}
