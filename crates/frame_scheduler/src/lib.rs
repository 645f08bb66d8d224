//! Decides when frames are prepared, drawn and presented.
//!
//! Three flags carry the protocol between caller threads, the render thread
//! and the presentation surface:
//! - `dirty`: a state change happened that the screen does not show yet;
//! - `in_flight`: a frame is being prepared, drawn, or awaits presentation;
//! - `swap_pending`: a drawn frame waits for the host to present it.
//!
//! Wake-ups go through a one-slot mailbox, so any number of requests made
//! while a wake is pending collapse into one.

mod render_thread;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

pub use render_thread::{RenderThread, RenderThreadError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSchedulerConfig {
    pub thread_name: String,
    /// Wake the render thread once at start so the first frame is drawn
    /// without waiting for a state change.
    pub initial_frame: bool,
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "map-render".to_owned(),
            initial_frame: true,
        }
    }
}

/// Result of handing the drawn frame to the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    /// Presented synchronously; the next frame may start right away.
    Completed,
    /// The host presents later and reports back through `swapped`.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    NoSurface,
    Busy,
    Clean,
    Rendered,
}

/// The render-thread side of a map: everything a wake-up may run.
pub trait FrameDriver {
    type Error: fmt::Display;

    fn setup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_surface_area(&self) -> bool;

    fn prepare(&mut self, requester: &FrameRequester) -> Result<(), Self::Error>;

    fn render(&mut self, requester: &FrameRequester) -> Result<(), Self::Error>;

    fn present(&mut self) -> Result<SwapStatus, Self::Error>;

    fn teardown(&mut self) {}
}

#[derive(Debug)]
struct RenderFlags {
    dirty: AtomicBool,
    in_flight: AtomicBool,
    swap_pending: AtomicBool,
}

#[derive(Debug)]
struct SchedulerShared {
    flags: RenderFlags,
    wake_sender: Sender<()>,
    wake_receiver: Receiver<()>,
}

impl SchedulerShared {
    fn wake(&self) {
        match self.wake_sender.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                panic!("render wake mailbox disconnected")
            }
        }
    }

    fn mark_dirty(&self) {
        self.flags.dirty.store(true, Ordering::Release);
        self.wake();
    }

    fn needs_swap(&self) -> bool {
        self.flags.swap_pending.swap(false, Ordering::AcqRel)
    }

    fn swap_complete(&self) {
        self.flags.swap_pending.store(false, Ordering::Release);
        self.flags.in_flight.store(false, Ordering::Release);
        if self.flags.dirty.load(Ordering::Acquire) {
            self.wake();
        }
    }
}

/// Cheap cloneable handle for threads that change map state.
#[derive(Debug, Clone)]
pub struct FrameRequester {
    shared: Arc<SchedulerShared>,
}

impl FrameRequester {
    /// Records that the screen is stale and wakes the render thread. Never
    /// blocks.
    pub fn mark_dirty(&self) {
        self.shared.mark_dirty();
    }

    /// Wakes the render thread without marking the screen stale. The driver
    /// decides while preparing whether the wake-up owes a frame.
    pub fn wake(&self) {
        self.shared.wake();
    }

    /// Test-and-clear: true once per drawn frame awaiting presentation.
    pub fn needs_swap(&self) -> bool {
        self.shared.needs_swap()
    }

    /// The host presented the frame.
    pub fn swapped(&self) {
        self.shared.swap_complete();
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.flags.dirty.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.flags.in_flight.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    shared: Arc<SchedulerShared>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    /// Starts dirty: the first frame is owed.
    pub fn new() -> Self {
        let (wake_sender, wake_receiver) = bounded(1);
        Self {
            shared: Arc::new(SchedulerShared {
                flags: RenderFlags {
                    dirty: AtomicBool::new(true),
                    in_flight: AtomicBool::new(false),
                    swap_pending: AtomicBool::new(false),
                },
                wake_sender,
                wake_receiver,
            }),
        }
    }

    pub fn requester(&self) -> FrameRequester {
        FrameRequester {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn mark_dirty(&self) {
        self.shared.mark_dirty();
    }

    pub fn needs_swap(&self) -> bool {
        self.shared.needs_swap()
    }

    pub fn on_swap_complete(&self) {
        self.shared.swap_complete();
    }

    pub(crate) fn wake_receiver(&self) -> &Receiver<()> {
        &self.shared.wake_receiver
    }

    /// Consumes a pending wake-up, if any. For hosts that pump the
    /// scheduler on their own thread.
    pub fn take_wake(&self) -> bool {
        self.shared.wake_receiver.try_recv().is_ok()
    }

    /// Handles one wake-up: prepares a frame unless one is in flight, and
    /// draws and presents it when the state is dirty.
    pub fn on_wake<D: FrameDriver>(&self, driver: &mut D) -> Result<WakeOutcome, D::Error> {
        if !driver.has_surface_area() {
            return Ok(WakeOutcome::NoSurface);
        }
        let flags = &self.shared.flags;
        if flags.in_flight.swap(true, Ordering::AcqRel) {
            return Ok(WakeOutcome::Busy);
        }

        // Taken before `prepare` reads any state, so marks arriving from
        // here on survive for the next wake.
        let dirty = flags.dirty.swap(false, Ordering::AcqRel);
        let requester = self.requester();
        if let Err(error) = driver.prepare(&requester) {
            if dirty {
                flags.dirty.store(true, Ordering::Release);
            }
            flags.in_flight.store(false, Ordering::Release);
            return Err(error);
        }
        if !dirty {
            flags.in_flight.store(false, Ordering::Release);
            if flags.dirty.load(Ordering::Acquire) {
                self.shared.wake();
            }
            return Ok(WakeOutcome::Clean);
        }

        if let Err(error) = driver.render(&requester) {
            flags.in_flight.store(false, Ordering::Release);
            return Err(error);
        }
        self.present(driver)?;
        Ok(WakeOutcome::Rendered)
    }

    /// Synchronous mode: prepare, draw and present unconditionally.
    pub fn run_once<D: FrameDriver>(&self, driver: &mut D) -> Result<(), D::Error> {
        let flags = &self.shared.flags;
        flags.in_flight.store(true, Ordering::Release);
        flags.dirty.store(false, Ordering::Release);
        let requester = self.requester();
        let drawn = driver
            .prepare(&requester)
            .and_then(|()| driver.render(&requester));
        if let Err(error) = drawn {
            flags.in_flight.store(false, Ordering::Release);
            return Err(error);
        }
        self.present(driver)
    }

    fn present<D: FrameDriver>(&self, driver: &mut D) -> Result<(), D::Error> {
        self.shared
            .flags
            .swap_pending
            .store(true, Ordering::Release);
        match driver.present() {
            Ok(SwapStatus::Completed) => {
                self.shared.swap_complete();
                Ok(())
            }
            Ok(SwapStatus::Pending) => Ok(()),
            Err(error) => {
                self.shared.swap_complete();
                Err(error)
            }
        }
    }
}
