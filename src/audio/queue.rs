use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;
use tracing::debug;

use super::track::TrackDescriptor;

/// Pending tracks plus the one currently loaded on the node.
///
/// Pure data: no I/O and no locking. The owning session is the only writer
/// and serializes access to it.
#[derive(Debug, Default)]
pub struct QueueStore {
    items: VecDeque<TrackDescriptor>,
    current: Option<TrackDescriptor>,
    position: PlaybackPosition,
}

/// Last node-reported position and when it was observed.
#[derive(Debug, Clone, Copy, Default)]
struct PlaybackPosition {
    offset: Duration,
    observed_at: Option<Instant>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one track at the back.
    pub fn append(&mut self, track: TrackDescriptor) {
        debug!("➕ Queued: {}", track.title);
        self.items.push_back(track);
    }

    /// Appends a batch keeping its order.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = TrackDescriptor>) {
        for track in tracks {
            self.append(track);
        }
    }

    /// Next pending track, without removing it.
    pub fn peek_next(&self) -> Option<&TrackDescriptor> {
        self.items.front()
    }

    /// Moves the next pending track into `current` and returns it.
    pub fn pop_front(&mut self) -> Option<TrackDescriptor> {
        let next = self.items.pop_front()?;
        self.current = Some(next.clone());
        self.position = PlaybackPosition::default();
        Some(next)
    }

    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current.as_ref()
    }

    /// Forgets the current track without touching pending ones.
    pub fn finish_current(&mut self) -> Option<TrackDescriptor> {
        self.position = PlaybackPosition::default();
        self.current.take()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.current.is_none()
    }

    pub fn pending(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.items.iter()
    }

    /// Empties both pending tracks and `current`. Returns how many pending
    /// tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.current = None;
        self.position = PlaybackPosition::default();
        if dropped > 0 {
            debug!("🗑️ Dropped {} queued tracks", dropped);
        }
        dropped
    }

    /// Records a position reported by the node. `running` is false while
    /// paused, which freezes the estimate.
    pub fn record_position(&mut self, offset: Duration, running: bool) {
        self.position = PlaybackPosition {
            offset,
            observed_at: running.then(Instant::now),
        };
    }

    /// Freezes or resumes the running estimate without a new node report.
    pub fn set_running(&mut self, running: bool) {
        let offset = self.position();
        self.record_position(offset, running);
    }

    /// Estimated position of the current track.
    pub fn position(&self) -> Duration {
        if self.current.is_none() {
            return Duration::ZERO;
        }

        let elapsed = self
            .position
            .observed_at
            .map(|at| at.elapsed())
            .unwrap_or_default();
        let estimate = self.position.offset + elapsed;

        match self.current.as_ref().and_then(|t| t.duration) {
            Some(length) => estimate.min(length),
            None => estimate,
        }
    }

    /// Sum of the known durations of current and pending tracks.
    pub fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.items.iter())
            .filter_map(|t| t.duration)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(name: &str) -> TrackDescriptor {
        TrackDescriptor {
            title: name.to_string(),
            author: "artist".to_string(),
            uri: None,
            identifier: name.to_string(),
            encoded: format!("enc-{}", name),
            duration: Some(Duration::from_secs(180)),
            requested_by: UserId::new(1),
        }
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut queue = QueueStore::new();
        queue.extend(vec![track("a"), track("b"), track("c")]);
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop_front().unwrap().title, "a");
        assert_eq!(queue.current().unwrap().title, "a");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_front().unwrap().title, "b");
        assert_eq!(queue.current().unwrap().title, "b");
        assert_eq!(queue.peek_next().unwrap().title, "c");
    }

    #[test]
    fn pop_on_empty_keeps_current() {
        let mut queue = QueueStore::new();
        queue.append(track("a"));
        queue.pop_front();

        assert!(queue.pop_front().is_none());
        assert_eq!(queue.current().unwrap().title, "a");
    }

    #[test]
    fn clear_empties_both_fields() {
        let mut queue = QueueStore::new();
        queue.extend(vec![track("a"), track("b")]);
        queue.pop_front();

        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert_eq!(queue.position(), Duration::ZERO);
    }

    #[test]
    fn total_duration_counts_current_and_pending() {
        let mut queue = QueueStore::new();
        queue.extend(vec![track("a"), track("b")]);
        queue.pop_front();
        assert_eq!(queue.total_duration(), Duration::from_secs(360));
    }

    #[test]
    fn paused_position_does_not_advance() {
        let mut queue = QueueStore::new();
        queue.append(track("a"));
        queue.pop_front();

        queue.record_position(Duration::from_secs(42), false);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.position(), Duration::from_secs(42));

        queue.set_running(true);
        std::thread::sleep(Duration::from_millis(20));
        assert!(queue.position() > Duration::from_secs(42));
    }

    #[test]
    fn position_is_capped_at_track_length() {
        let mut queue = QueueStore::new();
        queue.append(track("a"));
        queue.pop_front();

        queue.record_position(Duration::from_secs(500), false);
        assert_eq!(queue.position(), Duration::from_secs(180));
    }
}
