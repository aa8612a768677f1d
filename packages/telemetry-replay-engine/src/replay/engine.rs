// packages/telemetry-replay-engine/src/replay/engine.rs
//! Timed playback of a loaded message sequence
//!
//! [`ReplayEngine`] turns a static, shared message sequence into a live stream:
//! each call to [`ReplayEngine::next`] waits for the gap implied by the frame
//! delta to the previous message (scaled by the speed multiplier) and then
//! yields the next message. Messages sharing a frame are yielded back-to-back.
//!
//! Deadlines are chained off the previous message's *scheduled* time, not the
//! moment the caller came back for more, so per-message overhead and timer
//! lateness do not accumulate over a long run. The chain restarts at "now" on
//! play from stop, seek, loop wrap and resume after pause. A speed change in
//! the middle of a wait rescales whatever is left of that wait.
//!
//! Control changes (play/pause/stop/seek/speed) arrive through a
//! `tokio::sync::watch` channel and are observed at every wait point, so a
//! [`ReplayHandle`] held by another task takes effect within one in-flight
//! wait rather than after the sequence drains.

use crate::protocol::message::Message;
use crate::utils::errors::{EngineError, Result};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default simulation tick rate (frames per second)
pub const DEFAULT_TICK_RATE: f64 = 30.0;

/// Longest single wait; larger frame gaps are clamped
pub const MAX_FRAME_GAP: Duration = Duration::from_secs(60 * 60);

/// Position to seek to
///
/// Serialized externally tagged (`{"index": 5}`, `{"frame": 120}`); a bare
/// integer is also accepted and read as an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "SeekTargetRepr")]
pub enum SeekTarget {
    /// Message index into the sequence
    Index(usize),

    /// First message whose frame is at or after this frame
    Frame(u64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeekTargetRepr {
    Bare(usize),
    Tagged(TaggedSeekTarget),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedSeekTarget {
    Index(usize),
    Frame(u64),
}

impl From<SeekTargetRepr> for SeekTarget {
    fn from(repr: SeekTargetRepr) -> Self {
        match repr {
            SeekTargetRepr::Bare(index) | SeekTargetRepr::Tagged(TaggedSeekTarget::Index(index)) => {
                SeekTarget::Index(index)
            }
            SeekTargetRepr::Tagged(TaggedSeekTarget::Frame(frame)) => SeekTarget::Frame(frame),
        }
    }
}

/// Replayer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Root directory holding recorded sessions
    pub recordings_dir: PathBuf,

    /// Playback speed multiplier (> 0)
    pub speed: f64,

    /// Restart from the first message after the last one
    #[serde(rename = "loop")]
    pub loop_playback: bool,

    /// Where playback starts
    pub start_offset: Option<SeekTarget>,

    /// Nominal simulation frames per second used to turn frame deltas into time
    pub tick_rate: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            speed: 1.0,
            loop_playback: false,
            start_offset: None,
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.speed)?;
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "tick_rate must be positive, got {}",
                self.tick_rate
            )));
        }
        Ok(())
    }

    /// Wall-clock duration of one simulation frame at speed 1.0
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }
}

fn validate_speed(speed: f64) -> Result<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "speed must be a positive multiplier, got {}",
            speed
        )))
    }
}

/// Playback run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeekRequest {
    generation: u64,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Control {
    state: RunState,
    speed: f64,
    looping: bool,
    seek: Option<SeekRequest>,
}

fn clamp_gap(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_FRAME_GAP)
        .min(MAX_FRAME_GAP)
}

/// Resolve a seek target against a sequence
fn resolve_seek(messages: &[Message], target: SeekTarget) -> Result<usize> {
    match target {
        SeekTarget::Index(index) if index <= messages.len() => Ok(index),
        SeekTarget::Frame(frame) => messages
            .iter()
            .position(|m| m.frame() >= frame)
            .ok_or_else(|| EngineError::OutOfRange {
                target: format!("frame {}", frame),
                len: messages.len(),
            }),
        SeekTarget::Index(index) => Err(EngineError::OutOfRange {
            target: format!("index {}", index),
            len: messages.len(),
        }),
    }
}

/// Cloneable remote control for a [`ReplayEngine`]
#[derive(Clone)]
pub struct ReplayHandle {
    control: Arc<watch::Sender<Control>>,
    messages: Arc<[Message]>,
}

impl ReplayHandle {
    pub fn play(&self) {
        self.control.send_modify(|c| c.state = RunState::Playing);
    }

    pub fn pause(&self) {
        self.control.send_modify(|c| c.state = RunState::Paused);
    }

    /// Stop playback and rewind to the first message
    pub fn stop(&self) {
        self.control.send_modify(|c| {
            c.state = RunState::Stopped;
            c.seek = Some(next_seek(c.seek, 0));
        });
    }

    /// Reposition without changing the run state
    pub fn seek(&self, target: SeekTarget) -> Result<usize> {
        let index = resolve_seek(&self.messages, target)?;
        self.control.send_modify(|c| c.seek = Some(next_seek(c.seek, index)));
        Ok(index)
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        validate_speed(speed)?;
        self.control.send_modify(|c| c.speed = speed);
        Ok(())
    }

    pub fn set_loop(&self, looping: bool) {
        self.control.send_modify(|c| c.looping = looping);
    }

    pub fn state(&self) -> RunState {
        self.control.borrow().state
    }

    pub fn speed(&self) -> f64 {
        self.control.borrow().speed
    }
}

fn next_seek(previous: Option<SeekRequest>, index: usize) -> SeekRequest {
    SeekRequest {
        generation: previous.map_or(1, |s| s.generation + 1),
        index,
    }
}

/// Scheduled yield of the message under the cursor
#[derive(Debug, Clone, Copy)]
struct PendingWait {
    deadline: Instant,
    speed: f64,
}

/// Timed, controllable playback over a shared message sequence
pub struct ReplayEngine {
    messages: Arc<[Message]>,
    frame_duration: Duration,
    handle: ReplayHandle,
    observed: watch::Receiver<Control>,
    cursor: usize,
    last_frame: Option<u64>,
    /// Scheduled time of the last yielded message
    anchor: Option<Instant>,
    wait: Option<PendingWait>,
    applied_seek: u64,
    emitted: u64,
    loops: u64,
}

impl ReplayEngine {
    /// Create a stopped engine positioned at `config.start_offset` (or 0)
    pub fn new(messages: impl Into<Arc<[Message]>>, config: &ReplayConfig) -> Result<Self> {
        config.validate()?;
        let messages = messages.into();

        let start = match config.start_offset {
            Some(target) => resolve_seek(&messages, target)?,
            None => 0,
        };

        let (tx, observed) = watch::channel(Control {
            state: RunState::Stopped,
            speed: config.speed,
            looping: config.loop_playback,
            seek: None,
        });

        Ok(Self {
            handle: ReplayHandle {
                control: Arc::new(tx),
                messages: Arc::clone(&messages),
            },
            messages,
            frame_duration: config.frame_duration(),
            observed,
            cursor: start,
            last_frame: None,
            anchor: None,
            wait: None,
            applied_seek: 0,
            emitted: 0,
            loops: 0,
        })
    }

    /// Remote control usable from other tasks
    pub fn handle(&self) -> ReplayHandle {
        self.handle.clone()
    }

    pub fn play(&mut self) {
        self.handle.play();
        self.sync_control();
    }

    pub fn pause(&mut self) {
        self.handle.pause();
        self.sync_control();
    }

    /// Stop and rewind to index 0
    pub fn stop(&mut self) {
        self.handle.stop();
        self.sync_control();
    }

    /// Reposition the cursor; the run state is unchanged
    ///
    /// Fails with `OutOfRange` (leaving the engine untouched) if the target is
    /// past the end of the sequence.
    pub fn seek(&mut self, target: SeekTarget) -> Result<()> {
        self.handle.seek(target)?;
        self.sync_control();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.handle.set_speed(speed)?;
        self.sync_control();
        Ok(())
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.handle.set_loop(looping);
        self.sync_control();
    }

    pub fn state(&self) -> RunState {
        self.observed.borrow().state
    }

    pub fn speed(&self) -> f64 {
        self.observed.borrow().speed
    }

    pub fn is_looping(&self) -> bool {
        self.observed.borrow().looping
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages yielded so far, across loops and restarts
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Completed passes over the sequence while looping
    pub fn loops(&self) -> u64 {
        self.loops
    }

    /// Wait for and yield the next message
    ///
    /// Returns `None` when stopped, or at the end of the sequence when not
    /// looping. While paused this waits for the next control change.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            let control = self.sync_control();

            match control.state {
                RunState::Stopped => return None,
                RunState::Paused => {
                    // The engine owns a sender through its handle, so this cannot close.
                    if self.observed.changed().await.is_err() {
                        return None;
                    }
                    continue;
                }
                RunState::Playing => {}
            }

            if self.cursor >= self.messages.len() {
                if control.looping && !self.messages.is_empty() {
                    self.cursor = 0;
                    self.last_frame = None;
                    self.loops += 1;
                    trace!("Looping replay (pass {})", self.loops + 1);
                } else {
                    return None;
                }
            }

            let deadline = self.deadline_for(self.cursor, control.speed);
            if let Some(deadline) = deadline {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    changed = self.observed.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                        continue;
                    }
                }
            }

            self.wait = None;
            self.anchor = Some(match (deadline, self.anchor) {
                (Some(deadline), _) => deadline,
                (None, Some(anchor)) if self.last_frame.is_some() => anchor,
                _ => Instant::now(),
            });
            let message = self.messages[self.cursor].clone();
            self.cursor += 1;
            self.last_frame = Some(message.frame());
            self.emitted += 1;
            return Some(message);
        }
    }

    /// Consume the engine as a stream of messages
    pub fn into_stream(self) -> impl Stream<Item = Message> {
        futures::stream::unfold(self, |mut engine| async move {
            engine.next().await.map(|message| (message, engine))
        })
    }

    /// When `messages[index]` is due, or `None` to yield it right away
    fn deadline_for(&mut self, index: usize, speed: f64) -> Option<Instant> {
        let previous = self.last_frame?;
        let delta = self.messages[index].frame().saturating_sub(previous);
        if delta == 0 {
            return None;
        }

        let now = Instant::now();
        let wait = match self.wait {
            Some(wait) if wait.speed == speed => wait,
            Some(wait) => {
                let remaining = wait.deadline.saturating_duration_since(now);
                let rescaled = clamp_gap(remaining.as_secs_f64() * wait.speed / speed);
                trace!("Speed changed mid-wait, {:?} left becomes {:?}", remaining, rescaled);
                PendingWait {
                    deadline: now + rescaled,
                    speed,
                }
            }
            None => {
                let anchor = *self.anchor.get_or_insert(now);
                let gap = clamp_gap(self.frame_duration.as_secs_f64() * delta as f64 / speed);
                PendingWait {
                    deadline: anchor + gap,
                    speed,
                }
            }
        };

        self.wait = Some(wait);
        Some(wait.deadline)
    }

    /// Apply any pending control change and return the current control
    fn sync_control(&mut self) -> Control {
        let control = *self.observed.borrow_and_update();

        if let Some(seek) = control.seek {
            if seek.generation != self.applied_seek {
                self.applied_seek = seek.generation;
                self.cursor = seek.index.min(self.messages.len());
                self.last_frame = None;
                self.anchor = None;
                self.wait = None;
                debug!("Replay cursor moved to {}", self.cursor);
            }
        }

        if control.state != RunState::Playing {
            self.anchor = None;
            self.wait = None;
        }

        control
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn sequence(frames: &[u64]) -> Vec<Message> {
        frames
            .iter()
            .enumerate()
            .map(|(seq, frame)| Message::data(*frame).with_payload(json!({ "seq": seq })))
            .collect()
    }

    fn seq_of(message: &Message) -> u64 {
        message.payload().unwrap()["seq"].as_u64().unwrap()
    }

    fn config(tick_rate: f64, speed: f64, looping: bool) -> ReplayConfig {
        ReplayConfig {
            tick_rate,
            speed,
            loop_playback: looping,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_bad_speed() {
        let messages = sequence(&[0, 1]);
        assert!(ReplayEngine::new(messages.clone(), &config(30.0, 0.0, false)).is_err());
        assert!(ReplayEngine::new(messages.clone(), &config(30.0, -2.0, false)).is_err());
        assert!(ReplayEngine::new(messages.clone(), &config(30.0, f64::NAN, false)).is_err());

        let mut engine = ReplayEngine::new(messages, &ReplayConfig::default()).unwrap();
        assert!(matches!(engine.set_speed(0.0), Err(EngineError::InvalidConfig(_))));
        assert_eq!(engine.speed(), 1.0);
    }

    #[test]
    fn test_seek_out_of_range_leaves_state() {
        let mut engine = ReplayEngine::new(sequence(&[0, 5, 10]), &ReplayConfig::default()).unwrap();
        engine.play();
        engine.seek(SeekTarget::Index(2)).unwrap();

        assert!(matches!(
            engine.seek(SeekTarget::Index(4)),
            Err(EngineError::OutOfRange { len: 3, .. })
        ));
        assert!(engine.seek(SeekTarget::Frame(11)).is_err());
        assert_eq!(engine.cursor(), 2);
        assert_eq!(engine.state(), RunState::Playing);
    }

    #[test]
    fn test_seek_by_frame() {
        let mut engine = ReplayEngine::new(sequence(&[0, 5, 5, 10]), &ReplayConfig::default()).unwrap();
        engine.seek(SeekTarget::Frame(4)).unwrap();
        assert_eq!(engine.cursor(), 1);
        engine.seek(SeekTarget::Frame(10)).unwrap();
        assert_eq!(engine.cursor(), 3);
        assert_eq!(engine.state(), RunState::Stopped);
    }

    #[test]
    fn test_start_offset() {
        let mut cfg = ReplayConfig::default();
        cfg.start_offset = Some(SeekTarget::Frame(5));
        let engine = ReplayEngine::new(sequence(&[0, 5, 10]), &cfg).unwrap();
        assert_eq!(engine.cursor(), 1);

        cfg.start_offset = Some(SeekTarget::Index(9));
        assert!(matches!(
            ReplayEngine::new(sequence(&[0, 5, 10]), &cfg),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_stopped_engine_yields_nothing() {
        let mut engine = ReplayEngine::new(sequence(&[0, 1]), &ReplayConfig::default()).unwrap();
        assert!(engine.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timing_scaled_by_speed() {
        // 9 gaps of 10 frames at 90 frames/s: 1.0s of simulated time
        let frames: Vec<u64> = (0..10).map(|i| i * 10).collect();
        let mut engine = ReplayEngine::new(sequence(&frames), &config(90.0, 2.0, false)).unwrap();
        engine.play();

        let start = Instant::now();
        let mut count = 0;
        while engine.next().await.is_some() {
            count += 1;
        }
        let elapsed = start.elapsed().as_secs_f64();

        assert_eq!(count, 10);
        assert!((0.45..=0.55).contains(&elapsed), "elapsed {}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_overhead_does_not_accumulate() {
        // 100 gaps of 10ms; the consumer spends 5ms on each message
        let frames: Vec<u64> = (0..=100).collect();
        let mut engine = ReplayEngine::new(sequence(&frames), &config(100.0, 1.0, false)).unwrap();
        engine.play();

        let start = Instant::now();
        while engine.next().await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let elapsed = start.elapsed().as_secs_f64();

        assert!((1.0..=1.02).contains(&elapsed), "elapsed {}", elapsed);
    }

    #[tokio::test]
    async fn test_wall_clock_rate_at_high_speed() {
        // 120 gaps at 60 frames/s: 2s of simulated time
        let frames: Vec<u64> = (0..=120).collect();
        for speed in [2.0, 4.0] {
            let mut engine = ReplayEngine::new(sequence(&frames), &config(60.0, speed, false)).unwrap();
            engine.play();

            let expected = 2.0 / speed;
            let start = std::time::Instant::now();
            while engine.next().await.is_some() {
                // Stand-in for per-message delivery work
                std::thread::sleep(Duration::from_millis(1));
            }
            let elapsed = start.elapsed().as_secs_f64();

            assert!(
                (elapsed - expected).abs() <= expected * 0.1,
                "speed {}: elapsed {} expected {}",
                speed,
                elapsed,
                expected
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_rescales_pending_wait() {
        let mut engine = ReplayEngine::new(sequence(&[0, 10]), &config(1.0, 1.0, false)).unwrap();
        let handle = engine.handle();
        engine.play();

        let start = Instant::now();
        engine.next().await.unwrap();
        let waiter = tokio::spawn(async move {
            let message = engine.next().await;
            (message, Instant::now())
        });

        // 8 of 10 seconds have passed; the last 2 seconds run at double speed
        tokio::time::sleep(Duration::from_secs(8)).await;
        handle.set_speed(2.0).unwrap();

        let (message, yielded_at) = waiter.await.unwrap();
        assert_eq!(seq_of(&message.unwrap()), 1);
        let elapsed = (yielded_at - start).as_secs_f64();
        assert!((9.0..=9.01).contains(&elapsed), "elapsed {}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slowdown_mid_wait() {
        let mut engine = ReplayEngine::new(sequence(&[0, 10, 11]), &config(1.0, 1.0, false)).unwrap();
        let handle = engine.handle();
        engine.play();

        let start = Instant::now();
        engine.next().await.unwrap();
        let waiter = tokio::spawn(async move {
            let first = engine.next().await.map(|_| Instant::now());
            let second = engine.next().await.map(|_| Instant::now());
            (first, second)
        });

        tokio::time::sleep(Duration::from_secs(8)).await;
        handle.set_speed(0.5).unwrap();

        let (first, second) = waiter.await.unwrap();
        let first = (first.unwrap() - start).as_secs_f64();
        let second = (second.unwrap() - start).as_secs_f64();
        // 2s left become 4s, then one frame at half speed takes 2s
        assert!((12.0..=12.01).contains(&first), "first {}", first);
        assert!((14.0..=14.02).contains(&second), "second {}", second);
    }

    #[test]
    fn test_seek_target_forms() {
        assert_eq!(serde_json::from_str::<SeekTarget>("7").unwrap(), SeekTarget::Index(7));
        assert_eq!(
            serde_json::from_str::<SeekTarget>(r#"{"index": 3}"#).unwrap(),
            SeekTarget::Index(3)
        );
        assert_eq!(
            serde_json::from_str::<SeekTarget>(r#"{"frame": 120}"#).unwrap(),
            SeekTarget::Frame(120)
        );
        assert!(serde_json::from_str::<SeekTarget>("-1").is_err());
        assert!(serde_json::from_str::<SeekTarget>(r#"{"tick": 1}"#).is_err());

        assert_eq!(
            serde_json::to_value(SeekTarget::Frame(120)).unwrap(),
            json!({"frame": 120})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_frame_batch_has_no_gap() {
        let mut engine = ReplayEngine::new(sequence(&[7, 7, 7, 7]), &config(1.0, 1.0, false)).unwrap();
        engine.play();

        let start = Instant::now();
        let yielded: Vec<Message> = engine.into_stream().collect().await;
        assert_eq!(yielded.len(), 4);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_wraps_modulo_length() {
        let original = sequence(&[0, 1, 1, 3, 4]);
        let mut engine = ReplayEngine::new(original.clone(), &config(60.0, 1.0, true)).unwrap();
        engine.play();

        for k in 0..original.len() * 4 {
            let message = engine.next().await.unwrap();
            assert_eq!(message, original[k % original.len()], "index {}", k);
        }
        assert_eq!(engine.loops(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let original = sequence(&[0, 1, 2]);
        let mut engine = ReplayEngine::new(original.clone(), &config(30.0, 1.0, false)).unwrap();
        engine.play();
        engine.next().await.unwrap();
        engine.next().await.unwrap();

        engine.stop();
        assert_eq!(engine.cursor(), 0);
        assert!(engine.next().await.is_none());

        engine.play();
        let replayed: Vec<u64> = engine.into_stream().map(|m| seq_of(&m)).collect().await;
        assert_eq!(replayed, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_wait() {
        // 1 frame per second, 10_000 frame gap: the second message is hours away
        let mut engine = ReplayEngine::new(sequence(&[0, 10_000]), &config(1.0, 1.0, false)).unwrap();
        let handle = engine.handle();
        engine.play();
        engine.next().await.unwrap();

        let waiter = tokio::spawn(async move { engine.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("stop must interrupt the wait")
            .unwrap();
        assert!(result.is_none());
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_until_resumed() {
        let mut engine = ReplayEngine::new(sequence(&[0, 1, 2]), &config(10.0, 1.0, false)).unwrap();
        let handle = engine.handle();
        engine.play();
        engine.next().await.unwrap();
        handle.pause();

        let waiter = tokio::spawn(async move {
            let message = engine.next().await;
            (message, Instant::now())
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        let resumed_at = Instant::now();
        handle.play();
        let (message, yielded_at) = waiter.await.unwrap();
        assert_eq!(seq_of(&message.unwrap()), 1);
        // The full 100ms gap is waited again after resuming
        assert!(yielded_at - resumed_at >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_from_handle_while_playing() {
        let mut engine = ReplayEngine::new(sequence(&[0, 100, 200, 300]), &config(1.0, 1.0, false)).unwrap();
        let handle = engine.handle();
        engine.play();
        engine.next().await.unwrap();

        handle.seek(SeekTarget::Index(3)).unwrap();
        let start = Instant::now();
        let message = engine.next().await.unwrap();
        assert_eq!(seq_of(&message), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(engine.next().await.is_none());
    }
}
