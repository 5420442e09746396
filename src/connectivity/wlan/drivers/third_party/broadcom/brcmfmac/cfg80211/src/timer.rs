// Copyright 2024 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    futures::channel::mpsc,
    log::debug,
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{runtime::Handle, task::JoinHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    Escan,
    Connect,
    Disconnect,
    Roam,
    ApStart,
    SignalReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    #[cfg(test)]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// A timer expiration. `id` identifies the arming of the timer that produced it, so an
/// expiration that raced with a stop or re-arm can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutEvent {
    pub kind: TimerKind,
    pub id: EventId,
}

/// Delivers timeout events after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, event: TimeoutEvent, delay: Duration);
    fn cancel(&self, event: TimeoutEvent);
}

/// A single-shot timer. Starting an armed timer re-arms it.
pub struct Timer {
    kind: TimerKind,
    scheduler: Arc<dyn Scheduler>,
    next_id: Arc<AtomicU64>,
    armed: Mutex<Option<EventId>>,
}

impl Timer {
    fn new(kind: TimerKind, scheduler: Arc<dyn Scheduler>, next_id: Arc<AtomicU64>) -> Self {
        Self { kind, scheduler, next_id, armed: Mutex::new(None) }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn start(&self, delay: Duration) {
        let mut armed = self.armed.lock();
        if let Some(id) = armed.take() {
            self.scheduler.cancel(TimeoutEvent { kind: self.kind, id });
        }
        let id = EventId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *armed = Some(id);
        self.scheduler.schedule(TimeoutEvent { kind: self.kind, id }, delay);
    }

    /// Stops the timer. Stopping a timer that is not running is a no-op.
    pub fn stop(&self) {
        if let Some(id) = self.armed.lock().take() {
            self.scheduler.cancel(TimeoutEvent { kind: self.kind, id });
        }
    }

    pub fn is_running(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Consumes an expiration. Returns false if the expiration belongs to an arming that has
    /// since been stopped or replaced.
    pub fn expire(&self, id: EventId) -> bool {
        let mut armed = self.armed.lock();
        if *armed == Some(id) {
            *armed = None;
            true
        } else {
            false
        }
    }
}

pub struct TimerSet {
    pub escan: Timer,
    pub connect: Timer,
    pub disconnect: Timer,
    pub roam: Timer,
    pub ap_start: Timer,
    pub signal_report: Timer,
}

impl TimerSet {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let next_id = Arc::new(AtomicU64::new(1));
        let timer = |kind| Timer::new(kind, Arc::clone(&scheduler), Arc::clone(&next_id));
        Self {
            escan: timer(TimerKind::Escan),
            connect: timer(TimerKind::Connect),
            disconnect: timer(TimerKind::Disconnect),
            roam: timer(TimerKind::Roam),
            ap_start: timer(TimerKind::ApStart),
            signal_report: timer(TimerKind::SignalReport),
        }
    }

    pub fn get(&self, kind: TimerKind) -> &Timer {
        match kind {
            TimerKind::Escan => &self.escan,
            TimerKind::Connect => &self.connect,
            TimerKind::Disconnect => &self.disconnect,
            TimerKind::Roam => &self.roam,
            TimerKind::ApStart => &self.ap_start,
            TimerKind::SignalReport => &self.signal_report,
        }
    }

    pub fn stop_all(&self) {
        for timer in &[
            &self.escan,
            &self.connect,
            &self.disconnect,
            &self.roam,
            &self.ap_start,
            &self.signal_report,
        ] {
            timer.stop();
        }
    }
}

struct ManualClock {
    now: Duration,
    pending: Vec<(Duration, TimeoutEvent)>,
}

/// A scheduler driven by a virtual clock. Nothing fires until `advance` is called, which makes
/// it the scheduler of choice for simulated buses and tests.
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self { clock: Mutex::new(ManualClock { now: Duration::from_millis(0), pending: vec![] }) }
    }

    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Moves the clock forward and returns the events that came due, earliest first.
    pub fn advance(&self, delta: Duration) -> Vec<TimeoutEvent> {
        let mut clock = self.clock.lock();
        clock.now += delta;
        let now = clock.now;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            clock.pending.drain(..).partition(|(deadline, _)| *deadline <= now);
        clock.pending = pending;
        due.sort();
        due.into_iter().map(|(_, event)| event).collect()
    }

    /// Time left until the pending event of `kind` fires.
    pub fn scheduled(&self, kind: TimerKind) -> Option<Duration> {
        let clock = self.clock.lock();
        clock
            .pending
            .iter()
            .find(|(_, event)| event.kind == kind)
            .map(|(deadline, _)| *deadline - clock.now)
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.scheduled(kind).is_some()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, event: TimeoutEvent, delay: Duration) {
        let mut clock = self.clock.lock();
        let deadline = clock.now + delay;
        clock.pending.push((deadline, event));
    }

    fn cancel(&self, event: TimeoutEvent) {
        self.clock.lock().pending.retain(|(_, pending)| *pending != event);
    }
}

pub type TimeStream = mpsc::UnboundedReceiver<TimeoutEvent>;

/// Runs each armed timer as a task on a tokio runtime and posts expirations onto a
/// `TimeStream`, where they are picked up by `Cfg80211::serve_timeouts`.
pub struct WorkQueueScheduler {
    runtime: Handle,
    sink: mpsc::UnboundedSender<TimeoutEvent>,
    tasks: Arc<Mutex<HashMap<TimeoutEvent, JoinHandle<()>>>>,
}

impl WorkQueueScheduler {
    /// Timer tasks are spawned onto `runtime`, which needs its time driver enabled.
    pub fn new(runtime: Handle) -> (Self, TimeStream) {
        let (sink, stream) = mpsc::unbounded();
        (Self { runtime, sink, tasks: Arc::new(Mutex::new(HashMap::new())) }, stream)
    }
}

impl Scheduler for WorkQueueScheduler {
    fn schedule(&self, event: TimeoutEvent, delay: Duration) {
        let sink = self.sink.clone();
        let tasks = Arc::clone(&self.tasks);
        // Held across the spawn so the task cannot deregister before it is registered.
        let mut pending = self.tasks.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().remove(&event);
            if sink.unbounded_send(event).is_err() {
                debug!("timeout stream closed, dropping {:?}", event);
            }
        });
        if let Some(replaced) = pending.insert(event, task) {
            replaced.abort();
        }
    }

    fn cancel(&self, event: TimeoutEvent) {
        if let Some(task) = self.tasks.lock().remove(&event) {
            task.abort();
        }
    }
}

impl Drop for WorkQueueScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}
