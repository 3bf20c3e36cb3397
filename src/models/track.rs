use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single searchable/playable item as returned by the gateway search
/// endpoint. Immutable once parsed; `video_id` is derived from `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub channel: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub thumbnail: String,
    pub url: String,
    pub video_id: String,
}

impl Track {
    /// Builds a track from one gateway search item. Returns `None` when
    /// the item carries no source URL or no parseable video id; callers
    /// skip such items.
    pub fn from_search_item(item: &Value) -> Option<Self> {
        let url = item.get("url")?.as_str()?.to_string();
        let video_id = video_id_from_url(&url)?;
        Some(Self {
            title: text_field(item, "title"),
            // Some gateway deployments label the uploader "author".
            channel: item
                .get("channel")
                .or_else(|| item.get("author"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            duration: text_field(item, "duration"),
            thumbnail: text_field(item, "thumbnail"),
            url,
            video_id,
        })
    }
}

fn text_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extracts the `v` query parameter from a watch URL. Falls back to a
/// plain substring scan for source strings that do not parse as URLs.
pub fn video_id_from_url(url: &str) -> Option<String> {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            if !id.is_empty() {
                return Some(id.into_owned());
            }
        }
    }
    url.split_once("v=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or(rest).to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn video_id_comes_from_query_param() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?list=PL123&v=abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn video_id_falls_back_to_substring_scan() {
        assert_eq!(
            video_id_from_url("watch?v=xyz789&feature=share"),
            Some("xyz789".to_string())
        );
    }

    #[test]
    fn urls_without_video_id_yield_none() {
        assert_eq!(video_id_from_url("https://youtu.be/dQw4w9WgXcQ"), None);
        assert_eq!(video_id_from_url("https://www.youtube.com/watch?v="), None);
    }

    #[test]
    fn search_item_parses_with_author_fallback() {
        let item = json!({
            "title": "Faded",
            "author": "Alan Walker",
            "duration": "3:32",
            "thumbnail": "https://img.example/faded.jpg",
            "url": "https://www.youtube.com/watch?v=60ItHLz5WEA"
        });
        let track = Track::from_search_item(&item).unwrap();
        assert_eq!(track.channel, "Alan Walker");
        assert_eq!(track.video_id, "60ItHLz5WEA");
    }

    #[test]
    fn search_item_without_usable_url_is_skipped() {
        assert!(Track::from_search_item(&json!({"title": "No url"})).is_none());
        assert!(
            Track::from_search_item(&json!({"title": "Short link", "url": "https://youtu.be/x"}))
                .is_none()
        );
    }
}
