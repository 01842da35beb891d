//! Time keeping and the per-frame scheduling loop.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Shared playback position used by decoded sources.
///
/// A wall clock follows real time; a manual clock only moves when the host
/// advances it, which keeps headless runs and tests deterministic. Clones
/// share the same underlying time.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    inner: ClockInner,
}

#[derive(Debug, Clone)]
enum ClockInner {
    Wall(Instant),
    Manual(Arc<AtomicU64>),
}

impl PlaybackClock {
    /// Wall clock starting now.
    pub fn start() -> Self {
        Self {
            inner: ClockInner::Wall(Instant::now()),
        }
    }

    /// Manual clock starting at zero.
    pub fn manual() -> Self {
        Self {
            inner: ClockInner::Manual(Arc::new(AtomicU64::new(0))),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.inner, ClockInner::Manual(_))
    }

    pub fn elapsed(&self) -> Duration {
        match &self.inner {
            ClockInner::Wall(origin) => origin.elapsed(),
            ClockInner::Manual(micros) => Duration::from_micros(micros.load(Ordering::Acquire)),
        }
    }

    /// Moves a manual clock forward. Wall clocks ignore this.
    pub fn advance(&self, delta: Duration) {
        if let ClockInner::Manual(micros) = &self.inner {
            micros.fetch_add(delta.as_micros() as u64, Ordering::AcqRel);
        }
    }

    /// Sets a manual clock to `time` if that is later than its current value.
    pub fn advance_to(&self, time: Duration) {
        if let ClockInner::Manual(micros) = &self.inner {
            micros.fetch_max(time.as_micros() as u64, Ordering::AcqRel);
        }
    }
}

/// Handle for one requested host frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// The host's per-frame callback facility.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Single scheduling entity: one pending frame request at a time, a tick per
/// delivered callback, then a fresh request.
#[derive(Debug, Default)]
pub struct MainLoop {
    pending: Option<FrameRequest>,
    ticks: u64,
}

impl MainLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }

    /// Requests the first frame. No-op while already running.
    pub fn start(&mut self, host: &mut dyn FrameScheduler) {
        if self.pending.is_some() {
            return;
        }
        self.pending = Some(host.request_frame());
        tracing::debug!("main loop started");
    }

    /// Cancels the pending frame request. No-op when stopped.
    pub fn stop(&mut self, host: &mut dyn FrameScheduler) {
        if let Some(request) = self.pending.take() {
            host.cancel_frame(request);
            tracing::debug!(ticks = self.ticks, "main loop stopped");
        }
    }

    /// Handles a host callback. Callbacks for requests this loop no longer
    /// waits on (cancelled or superseded) are ignored. Returns whether a tick
    /// ran.
    pub fn on_frame<F>(
        &mut self,
        request: FrameRequest,
        host: &mut dyn FrameScheduler,
        tick: F,
    ) -> bool
    where
        F: FnOnce(),
    {
        if self.pending != Some(request) {
            return false;
        }
        self.pending = None;
        tick();
        self.ticks += 1;
        self.pending = Some(host.request_frame());
        true
    }
}

/// Headless host that delivers frame callbacks at a fixed cadence.
#[derive(Debug)]
pub struct FixedRateHost {
    interval: Duration,
    now: Duration,
    next_id: u64,
    queue: VecDeque<FrameRequest>,
}

impl FixedRateHost {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_nanos(1_000_000_000 / fps.max(1) as u64),
            now: Duration::ZERO,
            next_id: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Delivers the next queued callback, advancing host time by one interval.
    pub fn next_frame(&mut self) -> Option<(FrameRequest, Duration)> {
        let request = self.queue.pop_front()?;
        self.now += self.interval;
        Some((request, self.now))
    }
}

impl FrameScheduler for FixedRateHost {
    fn request_frame(&mut self) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        self.queue.push_back(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.queue.retain(|queued| *queued != request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = PlaybackClock::manual();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.elapsed(), Duration::from_millis(250));

        other.advance_to(Duration::from_millis(100));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
        other.advance_to(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn wall_clock_moves_on_its_own() {
        let clock = PlaybackClock::start();
        clock.advance(Duration::from_secs(3600));
        assert!(clock.elapsed() < Duration::from_secs(3600));
        assert!(!clock.is_manual());
    }

    #[test]
    fn start_twice_requests_one_frame() {
        let mut host = FixedRateHost::new(60);
        let mut main_loop = MainLoop::new();
        main_loop.start(&mut host);
        main_loop.start(&mut host);
        assert_eq!(host.queued(), 1);
        assert!(main_loop.is_running());
    }

    #[test]
    fn stop_twice_is_harmless() {
        let mut host = FixedRateHost::new(60);
        let mut main_loop = MainLoop::new();
        main_loop.stop(&mut host);
        main_loop.start(&mut host);
        main_loop.stop(&mut host);
        main_loop.stop(&mut host);
        assert!(!main_loop.is_running());
        assert_eq!(host.queued(), 0);
    }

    #[test]
    fn each_callback_ticks_once_and_reschedules() {
        let mut host = FixedRateHost::new(50);
        let mut main_loop = MainLoop::new();
        let mut ticks = 0;
        main_loop.start(&mut host);
        for _ in 0..3 {
            let (request, _) = host.next_frame().unwrap();
            assert!(main_loop.on_frame(request, &mut host, || ticks += 1));
        }
        assert_eq!(ticks, 3);
        assert_eq!(main_loop.ticks(), 3);
        assert_eq!(host.queued(), 1);
        assert_eq!(host.now(), Duration::from_millis(60));
    }

    #[test]
    fn stale_callbacks_do_not_tick() {
        let mut host = FixedRateHost::new(60);
        let mut main_loop = MainLoop::new();
        main_loop.start(&mut host);
        let stale = main_loop.pending().unwrap();
        main_loop.stop(&mut host);

        let mut ticked = false;
        assert!(!main_loop.on_frame(stale, &mut host, || ticked = true));
        assert!(!ticked);
        assert!(host.next_frame().is_none());
    }
}
