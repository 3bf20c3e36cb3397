use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, options, routes, Build, FromForm, Request, Rocket, State};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{TaskFilter, Track};
use crate::player::{Demand, Player};
use crate::services::gateway::{DownloadPayload, Gateway};
use crate::services::resolver::{Resolution, StreamResolver};
use crate::services::search::{RecentSearches, SearchOutcome, SearchService};
use crate::storage::{self, LocalStore};
use crate::stores::{NoteStore, TaskStore};

/// Shared application state managed by Rocket. Locks are only held for
/// synchronous sections and are always released before any await point.
pub struct AppState {
    pub player: RwLock<Player>,
    pub tasks: RwLock<TaskStore>,
    pub notes: RwLock<NoteStore>,
    pub recents: RwLock<RecentSearches>,
    pub search: SearchService,
    pub resolver: StreamResolver,
    pub gateway: Arc<dyn Gateway>,
    pub store: LocalStore,
}

impl AppState {
    pub fn new(config: &Config, gateway: Arc<dyn Gateway>) -> Self {
        let store = LocalStore::new(config.data_dir.clone());

        // Session restore: absent or damaged keys fall back to defaults.
        let playlist: Vec<Track> = store.load(storage::PLAYLIST_KEY).unwrap_or_default();
        let current_index: i64 = store.load(storage::CURRENT_INDEX_KEY).unwrap_or(-1);
        let volume: f32 = store.load(storage::VOLUME_KEY).unwrap_or(1.0);
        let player = Player::restore(playlist, current_index, volume);

        Self {
            player: RwLock::new(player),
            tasks: RwLock::new(TaskStore::load(store.clone())),
            notes: RwLock::new(NoteStore::load(store.clone())),
            recents: RwLock::new(RecentSearches::load(store.clone())),
            search: SearchService::new(gateway.clone(), config.search_cache_capacity),
            resolver: StreamResolver::new(
                gateway.clone(),
                Duration::from_secs(config.resolve_timeout_secs),
            ),
            gateway,
            store,
        }
    }

    /// Writes the durable playback keys after a transition. Persistence
    /// failures are logged rather than surfaced: the in-memory state has
    /// already changed and the response should reflect it.
    fn persist_player(&self) {
        let player = self.player.read();
        let index = player.current_index().map(|i| i as i64).unwrap_or(-1);
        if let Err(e) = self.store.save(storage::PLAYLIST_KEY, player.playlist()) {
            log::error!("Error saving playlist: {}", e);
        }
        if let Err(e) = self.store.save(storage::CURRENT_INDEX_KEY, &index) {
            log::error!("Error saving current index: {}", e);
        }
        if let Err(e) = self.store.save(storage::VOLUME_KEY, &player.volume()) {
            log::error!("Error saving volume: {}", e);
        }
    }
}

/// Applies a playback transition, persists the durable keys, performs the
/// stream resolution the transition demanded, and returns the snapshot.
/// The resolver token is claimed inside the same critical section as the
/// transition, so token order always matches transition order.
async fn run_transition<F>(state: &AppState, apply: F) -> Json<Value>
where
    F: FnOnce(&mut Player) -> Demand,
{
    let pending = {
        let mut player = state.player.write();
        match apply(&mut player) {
            Demand::Resolve(track) => Some((track, state.resolver.begin())),
            Demand::None => None,
        }
    };
    state.persist_player();

    if let Some((track, token)) = pending {
        match state.resolver.resolve(&track.video_id, token).await {
            Ok(Resolution::Resolved(url)) => {
                state.player.write().stream_ready(&track.video_id, url);
            }
            Ok(Resolution::NoStream) => {
                state.player.write().stream_failed(&track.video_id);
            }
            Ok(Resolution::Stale) => {
                log::warn!("Discarding superseded stream resolution for {}", track.video_id);
            }
            Err(e) => {
                log::error!("Stream resolution for {} failed: {}", track.video_id, e);
                state.player.write().stream_failed(&track.video_id);
            }
        }
    }
    Json(state.player.read().snapshot())
}

fn error_response(error: AppError) -> (Status, Json<Value>) {
    let status = match error {
        AppError::InvalidInput(_) => Status::BadRequest,
        AppError::UnknownId(_) => Status::NotFound,
        _ => Status::InternalServerError,
    };
    if status == Status::InternalServerError {
        log::error!("Request failed: {}", error);
    }
    (status, Json(json!({ "error": error.to_string() })))
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// Adds the permissive CORS headers to every response, mirroring what the
/// upstream gateways expect from a public proxy.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new("Access-Control-Allow-Methods", "GET, OPTIONS"));
        response.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type"));
    }
}

// Preflight requests end here with an empty 200; the fairing adds the headers.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::Ok
}

// ---------------------------------------------------------------------------
// Gateway proxy
// ---------------------------------------------------------------------------

#[derive(FromForm)]
pub struct ProxyParams<'r> {
    #[field(name = "type")]
    kind: Option<&'r str>,
    q: Option<&'r str>,
    url: Option<&'r str>,
}

/// Proxy responses are either a JSON document (gateway payload or an error
/// envelope) or the raw text an upstream returned instead of JSON.
pub enum ProxyResponse {
    Json(Status, Value),
    Text(String),
}

impl<'r> Responder<'r, 'static> for ProxyResponse {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        match self {
            ProxyResponse::Json(status, body) => {
                let mut response = Json(body).respond_to(request)?;
                response.set_status(status);
                Ok(response)
            }
            ProxyResponse::Text(body) => Response::build()
                .status(Status::Ok)
                .header(ContentType::Text)
                .sized_body(body.len(), Cursor::new(body))
                .ok(),
        }
    }
}

#[get("/api/proxy?<params..>")]
pub async fn proxy(params: ProxyParams<'_>, state: &State<AppState>) -> ProxyResponse {
    match (params.kind, params.q, params.url) {
        (Some("search"), Some(q), _) if !q.is_empty() => {
            match state.gateway.search(q).await {
                Ok(body) => ProxyResponse::Json(Status::Ok, body),
                Err(e) => proxy_failure(e),
            }
        }
        (Some("download"), _, Some(url)) if !url.is_empty() => {
            match state.gateway.download(url).await {
                Ok(DownloadPayload::Json(body)) => ProxyResponse::Json(Status::Ok, body),
                Ok(DownloadPayload::Text(body)) => ProxyResponse::Text(body),
                Err(e) => proxy_failure(e),
            }
        }
        _ => ProxyResponse::Json(
            Status::BadRequest,
            json!({
                "error": "Invalid parameters. Use ?type=search&q=... or ?type=download&url=..."
            }),
        ),
    }
}

fn proxy_failure(error: AppError) -> ProxyResponse {
    log::error!("Proxy request failed: {}", error);
    ProxyResponse::Json(
        Status::InternalServerError,
        json!({ "error": error.to_string() }),
    )
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[get("/api/search?<q>")]
pub async fn search(q: Option<&str>, state: &State<AppState>) -> (Status, Json<Value>) {
    let query = q.unwrap_or("").trim().to_string();
    if query.is_empty() {
        return (
            Status::BadRequest,
            Json(json!({ "error": "Search query cannot be empty" })),
        );
    }

    // The query enters the history as soon as it is issued, whether or not
    // the gateway ends up answering it.
    state.recents.write().record(&query);

    match state.search.search(&query).await {
        Ok(SearchOutcome::Fresh(tracks)) => {
            let body = if tracks.is_empty() {
                json!({ "results": [], "error": "No results found" })
            } else {
                json!({ "results": &*tracks })
            };
            (Status::Ok, Json(body))
        }
        Ok(SearchOutcome::Stale) => (Status::Ok, Json(json!({ "results": [], "stale": true }))),
        Err(e) => {
            log::error!("Search for '{}' failed: {}", query, e);
            (
                Status::Ok,
                Json(json!({
                    "results": [],
                    "error": "Something went wrong. Please try again."
                })),
            )
        }
    }
}

#[get("/api/searches/recent")]
pub async fn recent_searches(state: &State<AppState>) -> Json<Value> {
    Json(json!({ "recent": state.recents.read().entries() }))
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[get("/api/player")]
pub async fn player_state(state: &State<AppState>) -> Json<Value> {
    Json(state.player.read().snapshot())
}

#[get("/api/player/play?<video>")]
pub async fn play_track(video: &str, state: &State<AppState>) -> (Status, Json<Value>) {
    // The track must already be known, either from the playlist or from the
    // latest search results.
    let track = state.player.read().track_by_video(video).or_else(|| {
        state
            .search
            .latest_results()
            .iter()
            .find(|track| track.video_id == video)
            .cloned()
    });

    let track = match track {
        Some(track) => track,
        None => {
            return (
                Status::NotFound,
                Json(json!({ "error": format!("Unknown track: {}", video) })),
            )
        }
    };

    (
        Status::Ok,
        run_transition(state.inner(), move |player| player.play(track)).await,
    )
}

#[get("/api/player/toggle")]
pub async fn toggle_playback(state: &State<AppState>) -> Json<Value> {
    run_transition(state.inner(), Player::toggle).await
}

#[get("/api/player/next")]
pub async fn next_track(state: &State<AppState>) -> Json<Value> {
    run_transition(state.inner(), Player::next).await
}

#[get("/api/player/previous")]
pub async fn previous_track(state: &State<AppState>) -> Json<Value> {
    run_transition(state.inner(), Player::previous).await
}

#[get("/api/player/ended")]
pub async fn playback_ended(state: &State<AppState>) -> Json<Value> {
    run_transition(state.inner(), Player::ended).await
}

#[get("/api/player/seek?<fraction>")]
pub async fn seek(fraction: Option<f32>, state: &State<AppState>) -> (Status, Json<Value>) {
    let fraction = match fraction {
        Some(f) => f,
        None => {
            return (
                Status::BadRequest,
                Json(json!({ "error": "Missing or invalid 'fraction' parameter" })),
            )
        }
    };
    state.player.write().seek(fraction);
    (Status::Ok, Json(state.player.read().snapshot()))
}

#[get("/api/player/volume?<level>")]
pub async fn set_volume(level: Option<f32>, state: &State<AppState>) -> (Status, Json<Value>) {
    let level = match level {
        Some(level) => level,
        None => {
            return (
                Status::BadRequest,
                Json(json!({ "error": "Missing or invalid 'level' parameter" })),
            )
        }
    };
    state.player.write().set_volume(level);
    state.persist_player();
    (Status::Ok, Json(state.player.read().snapshot()))
}

#[get("/api/player/mute?<on>")]
pub async fn set_mute(on: Option<bool>, state: &State<AppState>) -> (Status, Json<Value>) {
    let on = match on {
        Some(on) => on,
        None => {
            return (
                Status::BadRequest,
                Json(json!({ "error": "Missing or invalid 'on' parameter" })),
            )
        }
    };
    state.player.write().set_muted(on);
    (Status::Ok, Json(state.player.read().snapshot()))
}

#[get("/api/player/tick?<position>&<duration>")]
pub async fn playback_tick(
    position: Option<f32>,
    duration: Option<f32>,
    state: &State<AppState>,
) -> (Status, Json<Value>) {
    let (position, duration) = match (position, duration) {
        (Some(position), Some(duration)) => (position, duration),
        _ => {
            return (
                Status::BadRequest,
                Json(json!({ "error": "Missing or invalid 'position' or 'duration' parameter" })),
            )
        }
    };
    state.player.write().tick(position, duration);
    (Status::Ok, Json(state.player.read().snapshot()))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[get("/api/tasks?<filter>")]
pub async fn list_tasks(filter: Option<&str>, state: &State<AppState>) -> (Status, Json<Value>) {
    let filter = match filter.map(str::parse::<TaskFilter>).transpose() {
        Ok(filter) => filter.unwrap_or_default(),
        Err(e) => return error_response(e),
    };
    let tasks = state.tasks.read().list(filter);
    (Status::Ok, Json(json!({ "tasks": tasks })))
}

#[get("/api/tasks/add?<text>&<priority>")]
pub async fn add_task(
    text: Option<&str>,
    priority: Option<&str>,
    state: &State<AppState>,
) -> (Status, Json<Value>) {
    let priority = match priority.map(str::parse).transpose() {
        Ok(priority) => priority.unwrap_or_default(),
        Err(e) => return error_response(e),
    };
    match state.tasks.write().add(text.unwrap_or(""), priority) {
        Ok(task) => (Status::Ok, Json(json!({ "task": task }))),
        Err(e) => error_response(e),
    }
}

#[get("/api/tasks/toggle?<id>")]
pub async fn toggle_task(id: Option<Uuid>, state: &State<AppState>) -> (Status, Json<Value>) {
    let id = match require_id(id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    match state.tasks.write().toggle(id) {
        Ok(task) => (Status::Ok, Json(json!({ "task": task }))),
        Err(e) => error_response(e),
    }
}

#[get("/api/tasks/edit?<id>&<text>")]
pub async fn edit_task(
    id: Option<Uuid>,
    text: Option<&str>,
    state: &State<AppState>,
) -> (Status, Json<Value>) {
    let id = match require_id(id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    match state.tasks.write().edit(id, text.unwrap_or("")) {
        Ok(task) => (Status::Ok, Json(json!({ "task": task }))),
        Err(e) => error_response(e),
    }
}

#[get("/api/tasks/delete?<id>")]
pub async fn delete_task(id: Option<Uuid>, state: &State<AppState>) -> (Status, Json<Value>) {
    let id = match require_id(id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    match state.tasks.write().delete(id) {
        Ok(()) => (Status::Ok, Json(json!({ "deleted": id }))),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

#[get("/api/notes")]
pub async fn list_notes(state: &State<AppState>) -> Json<Value> {
    Json(json!({ "notes": state.notes.read().list() }))
}

#[get("/api/notes/add?<title>&<body>")]
pub async fn add_note(
    title: Option<&str>,
    body: Option<&str>,
    state: &State<AppState>,
) -> (Status, Json<Value>) {
    match state
        .notes
        .write()
        .add(title.unwrap_or(""), body.unwrap_or(""))
    {
        Ok(note) => (Status::Ok, Json(json!({ "note": note }))),
        Err(e) => error_response(e),
    }
}

#[get("/api/notes/edit?<id>&<title>&<body>")]
pub async fn edit_note(
    id: Option<Uuid>,
    title: Option<&str>,
    body: Option<&str>,
    state: &State<AppState>,
) -> (Status, Json<Value>) {
    let id = match require_id(id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    match state
        .notes
        .write()
        .edit(id, title.unwrap_or(""), body.unwrap_or(""))
    {
        Ok(note) => (Status::Ok, Json(json!({ "note": note }))),
        Err(e) => error_response(e),
    }
}

#[get("/api/notes/delete?<id>")]
pub async fn delete_note(id: Option<Uuid>, state: &State<AppState>) -> (Status, Json<Value>) {
    let id = match require_id(id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    match state.notes.write().delete(id) {
        Ok(()) => (Status::Ok, Json(json!({ "deleted": id }))),
        Err(e) => error_response(e),
    }
}

fn require_id(id: Option<Uuid>) -> crate::error::Result<Uuid> {
    id.ok_or_else(|| AppError::InvalidInput("Missing or invalid 'id' parameter".to_string()))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[get("/api/health")]
pub async fn health(state: &State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "playlist_tracks": state.player.read().playlist().len(),
        "tasks": state.tasks.read().len(),
        "notes": state.notes.read().list().len(),
        "server_time": chrono::Local::now().to_rfc3339()
    }))
}

// Error catchers
#[catch(404)]
pub fn not_found() -> Json<Value> {
    Json(json!({ "error": "Not found" }))
}

#[catch(422)]
pub fn unprocessable() -> Json<Value> {
    Json(json!({ "error": "Bad request parameters" }))
}

#[catch(500)]
pub fn server_error() -> Json<Value> {
    Json(json!({ "error": "Internal server error" }))
}

/// Assembles the Rocket instance. The gateway is injected so tests can swap
/// the real HTTP client for a stub.
pub fn build_rocket(config: Config, gateway: Arc<dyn Gateway>) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.host.clone()))
        .merge(("port", config.port));
    let state = AppState::new(&config, gateway);

    rocket::custom(figment)
        .manage(state)
        .attach(Cors)
        .mount(
            "/",
            routes![
                preflight,
                // Gateway proxy
                proxy,
                // Search
                search,
                recent_searches,
                // Player
                player_state,
                play_track,
                toggle_playback,
                next_track,
                previous_track,
                playback_ended,
                seek,
                set_volume,
                set_mute,
                playback_tick,
                // Tasks
                list_tasks,
                add_task,
                toggle_task,
                edit_task,
                delete_task,
                // Notes
                list_notes,
                add_note,
                edit_note,
                delete_note,
                // Health
                health,
            ],
        )
        .register("/", catchers![not_found, unprocessable, server_error])
}
