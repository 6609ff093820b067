//! Coalescing scheduler for activity notifications.
//!
//! The first event from an actor opens a window and arms a single timer.
//! Later events in the same window are merged into it. When the timer fires,
//! the window is closed and handed to a [`WindowSink`] exactly once. Windows
//! are identified by a [`WindowId`], so a timer only ever closes the window it
//! was armed for, and the merged state is read when the window closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flick_common::{MovieId, UserId};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Time source and timer used by the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;
}

/// Tokio's clock. Under a paused test runtime this is fully deterministic.
#[derive(Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActivityEvent {
    pub actor: UserId,
    pub subject: MovieId,
    pub at: Instant,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WindowId(u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Submitted {
    Opened(WindowId),
    Merged(WindowId),
}

/// What a window looked like when it closed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClosedWindow {
    pub actor: UserId,
    /// Subject of the most recent event.
    pub subject: MovieId,
    pub opened_at: Instant,
    pub multiple: bool,
    pub count: u32,
}

#[async_trait]
pub trait WindowSink: Send + Sync {
    async fn deliver(&self, window: ClosedWindow);
}

struct Window {
    id: WindowId,
    opened_at: Instant,
    latest: ActivityEvent,
    multiple: bool,
    count: u32,
}

impl Window {
    fn close(self) -> ClosedWindow {
        ClosedWindow {
            actor: self.latest.actor,
            subject: self.latest.subject,
            opened_at: self.opened_at,
            multiple: self.multiple,
            count: self.count,
        }
    }
}

#[derive(Default)]
struct Inner {
    windows: HashMap<UserId, Window>,
    /// Armed timers and in-flight deliveries, by the window they belong to.
    tasks: HashMap<WindowId, JoinHandle<()>>,
}

pub struct Coalescer {
    window: Duration,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn WindowSink>,
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Coalescer {
    pub fn new(window: Duration, clock: Arc<dyn Clock>, sink: Arc<dyn WindowSink>) -> Arc<Self> {
        Arc::new(Self {
            window,
            clock,
            sink,
            next_id: AtomicU64::new(1),
            inner: Mutex::default(),
        })
    }

    pub fn submit(self: &Arc<Self>, actor: UserId, subject: MovieId) -> Submitted {
        let at = self.clock.now();
        self.submit_event(ActivityEvent { actor, subject, at })
    }

    pub fn submit_event(self: &Arc<Self>, event: ActivityEvent) -> Submitted {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if let Some(open) = inner.windows.get_mut(&event.actor) {
            if now.saturating_duration_since(open.opened_at) < self.window {
                tracing::debug!(actor = %event.actor, subject = %event.subject, "notification already scheduled");
                open.latest = event;
                open.multiple = true;
                open.count += 1;
                return Submitted::Merged(open.id);
            }
        }

        // The timer for an overdue window has not run yet. Close it here so it
        // is still delivered, then start a fresh window.
        if let Some(overdue) = inner.windows.remove(&event.actor) {
            let id = overdue.id;
            if let Some(timer) = inner.tasks.remove(&id) {
                timer.abort();
            }
            tracing::warn!(actor = %event.actor, "window overdue, delivering now");
            let closed = overdue.close();
            let this = Arc::clone(self);
            let handle = tokio::spawn(async move {
                this.sink.deliver(closed).await;
                this.inner.lock().tasks.remove(&id);
            });
            inner.tasks.insert(id, handle);
        }

        let id = WindowId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let actor = event.actor.clone();
        tracing::info!(
            actor = %actor,
            subject = %event.subject,
            window = ?self.window,
            "sending notification when window closes"
        );
        inner.windows.insert(
            actor.clone(),
            Window {
                id,
                opened_at: now,
                latest: event,
                multiple: false,
                count: 1,
            },
        );

        let sleep = self.clock.sleep_until(now + self.window);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            sleep.await;
            this.fire(&actor, id).await;
            this.inner.lock().tasks.remove(&id);
        });
        inner.tasks.insert(id, handle);
        Submitted::Opened(id)
    }

    async fn fire(&self, actor: &UserId, id: WindowId) {
        let closed = {
            let mut inner = self.inner.lock();
            match inner.windows.get(actor) {
                Some(open) if open.id == id => inner.windows.remove(actor).map(Window::close),
                _ => None,
            }
        };
        match closed {
            Some(window) => self.sink.deliver(window).await,
            None => tracing::debug!(actor = %actor, ?id, "window already closed"),
        }
    }

    pub fn open_windows(&self) -> usize {
        self.inner.lock().windows.len()
    }

    /// Delivers every open window now and waits for deliveries already running.
    pub async fn flush(&self) {
        let (closed, running) = {
            let mut inner = self.inner.lock();
            let windows: Vec<Window> = inner.windows.drain().map(|(_, window)| window).collect();
            for window in &windows {
                if let Some(timer) = inner.tasks.remove(&window.id) {
                    timer.abort();
                }
            }
            let running: Vec<JoinHandle<()>> = inner.tasks.drain().map(|(_, task)| task).collect();
            (windows, running)
        };
        tracing::info!(windows = closed.len(), "flushing notification windows");
        for window in closed {
            self.sink.deliver(window.close()).await;
        }
        for task in running {
            let _ = task.await;
        }
    }

    /// Drops every open window and its timer without delivering anything.
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock();
        for (_, task) in inner.tasks.drain() {
            task.abort();
        }
        let dropped = inner.windows.len();
        inner.windows.clear();
        tracing::info!(dropped, "cancelled notification windows");
    }
}
