use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title_or_untitled(title),
            body: body.trim().to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Notes saved without a title display as "Untitled".
pub fn title_or_untitled(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
