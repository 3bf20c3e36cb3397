use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{abortable, AbortHandle, Aborted};
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::Result;
use crate::models::Track;
use crate::services::gateway::Gateway;
use crate::storage::{LocalStore, RECENT_SEARCHES_KEY};

/// How many recent queries the search history keeps.
pub const RECENT_LIMIT: usize = 5;

/// Outcome of a search: results that are safe to render, or a marker that
/// a newer search superseded this one and its response must be discarded.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Fresh(Arc<Vec<Track>>),
    Stale,
}

/// Session search with memoization and stale-response protection.
///
/// Results are memoized by exact query string in a bounded cache, and the
/// most recently published results stay available for track lookup. The
/// newest call always wins: it bumps the sequence token and aborts any
/// in-flight older request, and results are only published while their
/// token is still current.
pub struct SearchService {
    gateway: Arc<dyn Gateway>,
    memo: Cache<String, Arc<Vec<Track>>>,
    latest: RwLock<Arc<Vec<Track>>>,
    sequence: AtomicU64,
    inflight: Mutex<Option<AbortHandle>>,
}

impl SearchService {
    pub fn new(gateway: Arc<dyn Gateway>, capacity: u64) -> Self {
        Self {
            gateway,
            memo: Cache::builder().max_capacity(capacity).build(),
            latest: RwLock::new(Arc::new(Vec::new())),
            sequence: AtomicU64::new(0),
            inflight: Mutex::new(None),
        }
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let token = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = self.inflight.lock().take() {
            previous.abort();
        }

        if let Some(cached) = self.memo.get(query) {
            log::info!("Search memo hit for {query:?}");
            if !self.publish(token, cached.clone()) {
                return Ok(SearchOutcome::Stale);
            }
            return Ok(SearchOutcome::Fresh(cached));
        }

        let (request, handle) = abortable(self.gateway.search(query));
        *self.inflight.lock() = Some(handle);

        let response = match request.await {
            Err(Aborted) => {
                log::warn!("Search {query:?} superseded while in flight");
                return Ok(SearchOutcome::Stale);
            }
            Ok(result) => result?,
        };

        let tracks = Arc::new(parse_results(&response));
        if !self.publish(token, tracks.clone()) {
            log::warn!("Discarding stale search response for {query:?}");
            return Ok(SearchOutcome::Stale);
        }
        log::info!("Search {query:?} returned {} tracks", tracks.len());
        self.memo.insert(query.to_string(), tracks.clone());
        Ok(SearchOutcome::Fresh(tracks))
    }

    /// Latest published results. The play endpoint resolves video ids
    /// against these when the track is not already in the playlist.
    pub fn latest_results(&self) -> Arc<Vec<Track>> {
        self.latest.read().clone()
    }

    /// Installs `tracks` as the latest results if `token` is still
    /// current. The token check and the write share one critical section:
    /// a superseded response can never replace results a newer search
    /// already published.
    fn publish(&self, token: u64, tracks: Arc<Vec<Track>>) -> bool {
        let mut latest = self.latest.write();
        if self.sequence.load(Ordering::SeqCst) != token {
            return false;
        }
        *latest = tracks;
        true
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, query: &str) -> Option<Arc<Vec<Track>>> {
        self.memo.get(query)
    }
}

/// Accepts `{ "results": [...] }` or a bare array. Items without a
/// parseable video id are skipped; anything else means no results.
pub fn parse_results(response: &Value) -> Vec<Track> {
    let items = response
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| response.as_array());
    match items {
        Some(items) => items.iter().filter_map(Track::from_search_item).collect(),
        None => Vec::new(),
    }
}

/// Rolling history of the last distinct queries, newest first. Recorded
/// when a search is issued, not when it succeeds, matching the search box
/// behavior; persisted on every change.
pub struct RecentSearches {
    entries: Vec<String>,
    store: LocalStore,
}

impl RecentSearches {
    pub fn load(store: LocalStore) -> Self {
        let entries = store.load(RECENT_SEARCHES_KEY).unwrap_or_default();
        Self { entries, store }
    }

    pub fn record(&mut self, query: &str) {
        self.entries.retain(|q| q != query);
        self.entries.insert(0, query.to_string());
        self.entries.truncate(RECENT_LIMIT);
        if let Err(e) = self.store.save(RECENT_SEARCHES_KEY, &self.entries) {
            log::error!("Error saving recent searches: {}", e);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::testing::StubGateway;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn item(id: &str) -> Value {
        json!({
            "title": format!("Track {id}"),
            "channel": "Test Channel",
            "duration": "3:00",
            "thumbnail": "",
            "url": format!("https://www.youtube.com/watch?v={id}")
        })
    }

    fn results(ids: &[&str]) -> Value {
        json!({ "results": ids.iter().map(|id| item(id)).collect::<Vec<_>>() })
    }

    #[tokio::test]
    async fn second_identical_query_is_served_from_the_memo() {
        let stub = Arc::new(StubGateway::default());
        stub.set_search_response("lofi", results(&["a", "b"]));
        let service = SearchService::new(stub.clone(), 16);

        let first = match service.search("lofi").await.unwrap() {
            SearchOutcome::Fresh(tracks) => tracks,
            SearchOutcome::Stale => panic!("first search must be fresh"),
        };
        assert_eq!(first.len(), 2);

        // Network gone: the memo still answers.
        stub.set_failing(true);
        let second = match service.search("lofi").await.unwrap() {
            SearchOutcome::Fresh(tracks) => tracks,
            SearchOutcome::Stale => panic!("memo hit must be fresh"),
        };
        assert_eq!(*second, *first);
        assert_eq!(stub.search_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        // The memo hit also published.
        assert_eq!(*service.latest_results(), *second);
    }

    #[tokio::test]
    async fn slower_earlier_search_never_overwrites_newer_results() {
        let stub = Arc::new(StubGateway::default());
        stub.set_search_response("slow", results(&["old"]));
        stub.set_search_delay("slow", Duration::from_millis(80));
        stub.set_search_response("fast", results(&["new"]));
        let service = Arc::new(SearchService::new(stub, 16));

        let earlier = {
            let service = service.clone();
            tokio::spawn(async move { service.search("slow").await })
        };
        // Let the slow request reach the gateway before superseding it.
        tokio::time::sleep(Duration::from_millis(10)).await;

        match service.search("fast").await.unwrap() {
            SearchOutcome::Fresh(tracks) => assert_eq!(tracks[0].video_id, "new"),
            SearchOutcome::Stale => panic!("newest search must win"),
        }

        let earlier_outcome = earlier.await.unwrap().unwrap();
        assert!(matches!(earlier_outcome, SearchOutcome::Stale));
        assert!(service.cached("slow").is_none());
        assert!(service.cached("fast").is_some());
        assert_eq!(service.latest_results()[0].video_id, "new");
    }

    #[tokio::test]
    async fn completed_search_that_lost_the_race_cannot_republish() {
        let stub = Arc::new(StubGateway::default());
        stub.set_search_response("newer", results(&["new"]));
        let service = SearchService::new(stub, 16);

        // An earlier search claims its token, then stalls before
        // publishing.
        let older_token = service.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        match service.search("newer").await.unwrap() {
            SearchOutcome::Fresh(tracks) => assert_eq!(tracks[0].video_id, "new"),
            SearchOutcome::Stale => panic!("the newest search must be fresh"),
        }

        // Its response arrives only now; publication must be refused.
        let older_tracks = Arc::new(parse_results(&results(&["old"])));
        assert!(!service.publish(older_token, older_tracks));
        assert_eq!(service.latest_results()[0].video_id, "new");
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_and_does_not_poison_the_memo() {
        let stub = Arc::new(StubGateway::default());
        stub.set_search_response("query", results(&["x"]));
        stub.set_failing(true);
        let service = SearchService::new(stub.clone(), 16);

        assert!(service.search("query").await.is_err());

        stub.set_failing(false);
        match service.search("query").await.unwrap() {
            SearchOutcome::Fresh(tracks) => assert_eq!(tracks.len(), 1),
            SearchOutcome::Stale => panic!("retry after recovery must be fresh"),
        }
    }

    #[test]
    fn parse_results_accepts_wrapped_and_bare_shapes() {
        assert_eq!(parse_results(&results(&["a", "b"])).len(), 2);
        assert_eq!(
            parse_results(&json!([item("a"), item("b"), item("c")])).len(),
            3
        );
        assert!(parse_results(&json!({"unexpected": true})).is_empty());
        // Items without a parseable video id are skipped.
        let mixed = json!({ "results": [item("a"), {"title": "no url"}] });
        assert_eq!(parse_results(&mixed).len(), 1);
    }

    #[test]
    fn recent_searches_dedup_and_cap_at_limit() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let mut recents = RecentSearches::load(store.clone());

        for query in ["a", "b", "c", "d", "e", "f"] {
            recents.record(query);
        }
        assert_eq!(recents.entries(), ["f", "e", "d", "c", "b"]);

        // Repeating a query moves it to the front without duplicating.
        recents.record("d");
        assert_eq!(recents.entries(), ["d", "f", "e", "c", "b"]);

        // And the history survives a reload.
        let reloaded = RecentSearches::load(store);
        assert_eq!(reloaded.entries(), ["d", "f", "e", "c", "b"]);
    }
}
