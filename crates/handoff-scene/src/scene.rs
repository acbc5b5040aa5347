//! Scene timelines: JSONL loading and paced replay
//!
//! One JSON object per line with `t_start`, `t_end` and `text`; any other
//! keys ride along in the event's raw payload.

use handoff_core::{Error, Result, StreamEvent};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct SceneLoad {
    /// Valid events, sorted by start offset (stable).
    pub events: Vec<StreamEvent>,
    /// One `MalformedEvent` per rejected line.
    pub errors: Vec<Error>,
}

pub fn load_scene(path: &Path) -> Result<SceneLoad> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_scene(&content))
}

pub fn parse_scene(content: &str) -> SceneLoad {
    let mut events = Vec::new();
    let mut errors = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match StreamEvent::from_json_line(line, i + 1) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!("Skipping scene line: {}", e);
                errors.push(e);
            }
        }
    }

    events.sort_by(|a, b| a.start_offset().total_cmp(&b.start_offset()));
    SceneLoad { events, errors }
}

/// Events still relevant at `start_offset`: anything ending before it is skipped.
pub fn from_offset(events: &[StreamEvent], start_offset: f64) -> impl Iterator<Item = &StreamEvent> {
    events.iter().filter(move |e| e.end_offset() >= start_offset)
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Honor the gaps between event start offsets.
    pub realtime: bool,
    /// Playback multiplier; only used when `realtime` is set.
    pub speed: f64,
    pub start_offset: f64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            realtime: false,
            speed: 1.0,
            start_offset: 0.0,
        }
    }
}

/// Sleeps so events fire at their scene offsets (scaled by speed).
///
/// The first paced event fires immediately and anchors the timeline.
pub struct Pacer {
    speed: f64,
    anchor: Option<(Instant, f64)>,
}

impl Pacer {
    pub fn new(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            warn!("Invalid replay speed {}, using 1.0", speed);
            1.0
        };
        Self { speed, anchor: None }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// How long to wait before an event at `offset`, measured from `now`.
    pub fn delay_for(&mut self, offset: f64, now: Instant) -> Duration {
        let (start, base) = *self.anchor.get_or_insert((now, offset));
        let target = ((offset - base) / self.speed).max(0.0);
        Duration::from_secs_f64(target).saturating_sub(now.saturating_duration_since(start))
    }

    pub async fn wait_for(&mut self, offset: f64) {
        let delay = self.delay_for(offset, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Replay events on a background task, delivering them over a channel.
///
/// The task ends when every event has been sent or the receiver is dropped.
pub fn spawn_replay(
    events: Vec<StreamEvent>,
    options: ReplayOptions,
) -> (mpsc::Receiver<StreamEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move {
        let mut pacer = options.realtime.then(|| Pacer::new(options.speed));
        let mut sent = 0usize;
        for event in from_offset(&events, options.start_offset) {
            if let Some(pacer) = pacer.as_mut() {
                pacer.wait_for(event.start_offset()).await;
            }
            if tx.send(event.clone()).await.is_err() {
                debug!("Replay receiver dropped after {} events", sent);
                return;
            }
            sent += 1;
        }
        debug!("Replay finished: {} events", sent);
    });
    (rx, handle)
}
