use serde::Serialize;

use crate::models::Track;

/// `previous()` restarts the current track instead of moving back once
/// playback has run past this point.
pub const RESTART_THRESHOLD_SECS: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Empty,
    Loading,
    Playing,
    Paused,
    Ended,
}

/// Follow-up work a transition requires from the caller. Transitions
/// themselves never perform IO; the HTTP layer resolves streams and
/// persists snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Demand {
    None,
    Resolve(Track),
}

/// Playlist and playback state machine.
///
/// Owns the ordered playlist and the current-index pointer. All methods
/// are synchronous state transitions; media-element progress arrives via
/// `tick`/`ended` reports and stream resolution outcomes via
/// `stream_ready`/`stream_failed`.
#[derive(Debug, Clone)]
pub struct Player {
    playlist: Vec<Track>,
    current: Option<usize>,
    phase: Phase,
    volume: f32,
    muted: bool,
    position: f32,
    duration: f32,
    stream_url: Option<String>,
    notice: Option<String>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            playlist: Vec::new(),
            current: None,
            phase: Phase::Empty,
            volume: 1.0,
            muted: false,
            position: 0.0,
            duration: 0.0,
            stream_url: None,
            notice: None,
        }
    }
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a player from persisted state. An out-of-range stored
    /// index falls back to the first track; restored sessions start
    /// paused and without a stream URL, so resuming re-resolves.
    pub fn restore(playlist: Vec<Track>, current_index: i64, volume: f32) -> Self {
        let current = if playlist.is_empty() || current_index < 0 {
            None
        } else if (current_index as usize) < playlist.len() {
            Some(current_index as usize)
        } else {
            Some(0)
        };
        Self {
            phase: if current.is_some() {
                Phase::Paused
            } else {
                Phase::Empty
            },
            playlist,
            current,
            volume: volume.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Plays a track: moves the index if the track is already in the
    /// playlist (matched by video id), appends it otherwise. Always
    /// demands fresh stream resolution for the now-current track.
    pub fn play(&mut self, track: Track) -> Demand {
        self.notice = None;
        let index = match self
            .playlist
            .iter()
            .position(|t| t.video_id == track.video_id)
        {
            Some(existing) => existing,
            None => {
                self.playlist.push(track);
                self.playlist.len() - 1
            }
        };
        self.current = Some(index);
        self.begin_loading()
    }

    pub fn toggle(&mut self) -> Demand {
        match self.phase {
            Phase::Playing => {
                self.phase = Phase::Paused;
                Demand::None
            }
            Phase::Paused | Phase::Ended => {
                self.notice = None;
                if self.stream_url.is_some() {
                    self.phase = Phase::Playing;
                    Demand::None
                } else {
                    self.begin_loading()
                }
            }
            Phase::Empty | Phase::Loading => Demand::None,
        }
    }

    /// Advances to the next track, wrapping at the end of the playlist.
    pub fn next(&mut self) -> Demand {
        self.notice = None;
        if self.playlist.is_empty() {
            return Demand::None;
        }
        let next = match self.current {
            Some(index) => (index + 1) % self.playlist.len(),
            None => 0,
        };
        self.current = Some(next);
        self.begin_loading()
    }

    /// Restarts the current track when more than `RESTART_THRESHOLD_SECS`
    /// have elapsed; otherwise moves to the prior index, wrapping from 0
    /// to the last track.
    pub fn previous(&mut self) -> Demand {
        self.notice = None;
        if self.playlist.is_empty() {
            return Demand::None;
        }
        if self.position > RESTART_THRESHOLD_SECS {
            self.position = 0.0;
            return Demand::None;
        }
        let previous = match self.current {
            Some(0) | None => self.playlist.len() - 1,
            Some(index) => index - 1,
        };
        self.current = Some(previous);
        self.begin_loading()
    }

    /// Media-element end-of-track report; auto-advances.
    pub fn ended(&mut self) -> Demand {
        self.phase = Phase::Ended;
        self.next()
    }

    pub fn seek(&mut self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.position = fraction * self.duration;
    }

    /// Sets the stored volume; raising it above zero lifts an active
    /// mute, the way the volume slider behaves.
    pub fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        if self.volume > 0.0 && self.muted {
            self.muted = false;
        }
    }

    /// Mute is independent of the stored volume: un-muting restores it.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Media-element progress report.
    pub fn tick(&mut self, position: f32, duration: f32) {
        if self.current.is_none() {
            return;
        }
        if position.is_finite() && position >= 0.0 {
            self.position = position;
        }
        if duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        }
    }

    /// Resolution succeeded. Ignored (returns false) when the track is no
    /// longer current, so a slow resolution never hijacks playback.
    pub fn stream_ready(&mut self, video_id: &str, url: String) -> bool {
        if !self.is_current(video_id) {
            return false;
        }
        self.stream_url = Some(url);
        self.notice = None;
        self.phase = Phase::Playing;
        true
    }

    /// Resolution failed or yielded no URL: stay paused, surface a
    /// transient notice, never retry on our own.
    pub fn stream_failed(&mut self, video_id: &str) -> bool {
        if !self.is_current(video_id) {
            return false;
        }
        self.stream_url = None;
        self.phase = Phase::Paused;
        self.notice = Some("No stream available. Please try again.".to_string());
        true
    }

    fn begin_loading(&mut self) -> Demand {
        self.position = 0.0;
        self.duration = 0.0;
        self.stream_url = None;
        match self.current_track().cloned() {
            Some(track) => {
                self.phase = Phase::Loading;
                Demand::Resolve(track)
            }
            None => {
                self.phase = Phase::Empty;
                Demand::None
            }
        }
    }

    fn is_current(&self, video_id: &str) -> bool {
        self.current_track()
            .map(|t| t.video_id == video_id)
            .unwrap_or(false)
    }

    pub fn playlist(&self) -> &[Track] {
        &self.playlist
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|index| self.playlist.get(index))
    }

    pub fn track_by_video(&self, video_id: &str) -> Option<Track> {
        self.playlist
            .iter()
            .find(|t| t.video_id == video_id)
            .cloned()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "playlist": self.playlist,
            "current_index": self.current.map(|i| i as i64).unwrap_or(-1),
            "phase": self.phase,
            "is_playing": self.phase == Phase::Playing,
            "track": self.current_track(),
            "volume": self.volume,
            "muted": self.muted,
            "effective_volume": self.effective_volume(),
            "position": self.position,
            "duration": self.duration,
            "stream_url": self.stream_url,
            "notice": self.notice,
        })
    }
}
