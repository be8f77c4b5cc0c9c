//! Cycle timing coordinator.
//!
//! The dispatcher can rewrite GPIO registers far faster than a cartridge
//! ROM can respond, so every transaction is held for a minimum time by a
//! dedicated thread. The two sides meet at a single atomic flag:
//!
//! 1. The dispatcher latches the lines and raises `cycle_active` (release).
//! 2. The coordinator sees it (acquire), busy-holds for the calibrated
//!    time, then clears it (release).
//! 3. Whoever needs the lines next spins until it reads the flag clear
//!    (acquire).
//!
//! Holds are busy loops: the required resolution is far below what the
//! OS scheduler can sleep for.

use std::hint::spin_loop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::HoldTime;
use crate::error::{PortError, Result};
use crate::registers::FreeRunningCounter;

/// Spins between deadline checks while waiting for a cycle to end.
const WAIT_CHECK_INTERVAL: u32 = 1024;

/// Why a wait for the end of a cycle gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Timeout(Duration),
    Stopped,
}

/// The dispatcher's side of the cycle handshake.
pub trait CycleHandshake {
    /// Mark a cycle as in flight. Returns immediately.
    ///
    /// There is one flag, not a queue. Raising it while a hold is already
    /// running folds the new cycle into that hold, so back-to-back writes
    /// (which never wait) can share one hold: the second ends when the
    /// first does. Only a wait guarantees a full hold for what follows it.
    fn begin_cycle(&self);

    /// Spin until the in-flight cycle (if any) has been held long enough.
    fn wait_for_cycle_end(&self) -> std::result::Result<(), Stall>;
}

/// The shared `cycle_active` flag. One producer (dispatcher), one consumer
/// (coordinator); the only state the two threads share.
#[derive(Debug, Default)]
pub struct CycleFlag {
    active: AtomicBool,
}

impl CycleFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Handle to the background hold loop.
///
/// Dropping the handle stops and joins the thread.
pub struct CycleCoordinator {
    flag: Arc<CycleFlag>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
    timeout: Option<Duration>,
}

impl CycleCoordinator {
    /// Spawn the hold loop.
    ///
    /// `counter` is only read for [`HoldTime::TimerTicks`]. `affinity` pins
    /// the thread to that core if it exists.
    pub fn start(
        hold: HoldTime,
        counter: Box<dyn FreeRunningCounter>,
        affinity: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let flag = Arc::new(CycleFlag::new());
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let flag = Arc::clone(&flag);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("cart-cycle".to_string())
                .spawn(move || run(&flag, &running, hold, &*counter, affinity))
                .map_err(PortError::Spawn)?
        };
        log::info!("cycle coordinator started ({hold:?}, affinity {affinity:?})");

        Ok(Self {
            flag,
            running,
            thread: Some(thread),
            timeout,
        })
    }

    /// True while the hold loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the hold loop and wait for it to exit.
    ///
    /// Returns the number of cycles it held, or `None` if it was already
    /// stopped or had panicked.
    pub fn stop(&mut self) -> Option<u64> {
        self.running.store(false, Ordering::Release);
        let cycles = self.thread.take()?.join().ok();
        log::info!("cycle coordinator stopped after {cycles:?} cycles");
        cycles
    }
}

impl CycleHandshake for CycleCoordinator {
    fn begin_cycle(&self) {
        self.flag.raise();
    }

    fn wait_for_cycle_end(&self) -> std::result::Result<(), Stall> {
        let mut spins: u32 = 0;
        let mut started: Option<Instant> = None;
        while self.flag.is_active() {
            spin_loop();
            spins = spins.wrapping_add(1);
            if spins % WAIT_CHECK_INTERVAL == 0 {
                if !self.is_running() {
                    return Err(Stall::Stopped);
                }
                let since = *started.get_or_insert_with(Instant::now);
                if let Some(limit) = self.timeout {
                    let waited = since.elapsed();
                    if waited >= limit {
                        return Err(Stall::Timeout(waited));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for CycleCoordinator {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn run(
    flag: &CycleFlag,
    running: &AtomicBool,
    hold: HoldTime,
    counter: &dyn FreeRunningCounter,
    affinity: Option<usize>,
) -> u64 {
    if let Some(core) = affinity {
        pin_to_core(core);
    }

    let mut cycles = 0;
    while running.load(Ordering::Acquire) {
        if flag.is_active() {
            hold_cycle(hold, counter, running);
            flag.clear();
            cycles += 1;
        } else {
            spin_loop();
        }
    }
    cycles
}

fn hold_cycle(hold: HoldTime, counter: &dyn FreeRunningCounter, running: &AtomicBool) {
    match hold {
        HoldTime::Spins(n) => {
            for _ in 0..n {
                spin_loop();
            }
        }
        HoldTime::TimerTicks(n) => {
            let t0 = counter.counter_low();
            // A stuck counter must not keep the thread from stopping.
            while counter.counter_low().wrapping_sub(t0) < n && running.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }
}

fn pin_to_core(core: usize) {
    let Some(id) = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
    else {
        log::warn!("core {core} not available, cycle coordinator left unpinned");
        return;
    };
    if core_affinity::set_for_current(id) {
        log::debug!("cycle coordinator pinned to core {core}");
    } else {
        log::warn!("failed to pin cycle coordinator to core {core}");
    }
}
