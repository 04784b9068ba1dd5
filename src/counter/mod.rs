///! External pulse counters.
///!
///! # Design
///! A timer whose counter is clocked by an external signal counts the pulses of that signal. The
///! clock either comes from the external trigger pin in external clock mode 2 ([etr]) or from
///! the filtered TI1/TI2 input of a capture channel in external clock mode 1 ([input]).
///!
///! In both cases overflows of the 16 bit counter raise the update interrupt, which extends the
///! count in software and calls the registered [OverflowHandler]. Reading a counter returns the
///! pulses since the last read and restarts counting.
///!
///! # Note
///! The 16 bit counter and the overflow count are read and cleared one after the other. A pulse
///! arriving in between is lost.
use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::hardware::TimerPeripheral;
use crate::Error;

pub mod etr;
pub mod input;

pub use etr::{EtrConfig, EtrCounter};
pub use input::{ClockInput, InputConfig, InputCounter};

/// Receiver of counter overflow notifications.
///
/// Handlers are called from the timer update interrupt and must return quickly.
pub trait OverflowHandler: Sync {
    /// Handle one overflow of the counter `name`. `overflows` counts the overflows since the last
    /// read, including this one.
    fn on_overflow(&self, name: &'static str, overflows: u32);
}

/// Plain function handler.
pub type OverflowFn = fn(&'static str, u32);

impl OverflowHandler for OverflowFn {
    fn on_overflow(&self, name: &'static str, overflows: u32) {
        self(name, overflows)
    }
}

/// Control commands of a pulse counter.
#[derive(Copy, Clone)]
pub enum Command {
    /// Zero the counter and the overflow count without reading them.
    Reset,
    /// Replace the overflow handler.
    SetOverflowHandler(Option<&'static dyn OverflowHandler>),
}

/// Software extension of a 16 bit hardware counter.
///
/// Shared between the device and the update interrupt, so everything is accessed through `&self`.
pub(crate) struct Extension {
    overflows: AtomicU32,
    handler: Mutex<Cell<Option<&'static dyn OverflowHandler>>>,
}

impl Extension {
    pub(crate) const fn new() -> Self {
        Self {
            overflows: AtomicU32::new(0),
            handler: Mutex::new(Cell::new(None)),
        }
    }

    pub(crate) fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Arm the update interrupt on a fresh count and start the counter.
    pub(crate) fn start<T: TimerPeripheral>(&self, timer: &mut T) {
        timer.clear_update();
        timer.listen_update(true);
        self.clear(timer);
        timer.set_enabled(true);
    }

    pub(crate) fn stop<T: TimerPeripheral>(&self, timer: &mut T) {
        timer.listen_update(false);
        timer.set_enabled(false);
    }

    pub(crate) fn on_update<T: TimerPeripheral>(&self, name: &'static str, timer: &T) {
        if !timer.is_update_pending() {
            return;
        }
        timer.clear_update();
        let overflows = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(handler) = critical_section::with(|cs| self.handler.borrow(cs).get()) {
            handler.on_overflow(name, overflows);
        }
    }

    pub(crate) fn take<T: TimerPeripheral>(&self, timer: &T) -> u32 {
        let count = (self.overflows.load(Ordering::Relaxed) << 16) | timer.counter() as u32;
        self.clear(timer);
        count
    }

    fn clear<T: TimerPeripheral>(&self, timer: &T) {
        timer.set_counter(0);
        self.overflows.store(0, Ordering::Relaxed);
    }

    /// Execute a command on an open or closed counter.
    pub(crate) fn control<T: TimerPeripheral>(
        &self,
        open: bool,
        timer: &T,
        command: Command,
    ) -> Result<(), Error> {
        match command {
            Command::Reset => {
                if !open {
                    return Err(Error::NotOpen);
                }
                self.clear(timer);
            }
            Command::SetOverflowHandler(handler) => {
                critical_section::with(|cs| self.handler.borrow(cs).set(handler));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::hardware::timers::{Smcr, TimeBase};
    use crate::hardware::TimerId;

    /// A bare counter register with a settable update flag.
    #[derive(Default)]
    struct Register {
        counter: AtomicU32,
        pending: AtomicBool,
    }

    impl TimerPeripheral for Register {
        fn id(&self) -> TimerId {
            TimerId::Tim3
        }
        fn set_time_base(&mut self, _base: TimeBase) {}
        fn smcr(&self) -> Smcr {
            Smcr::new_with_raw_value(0)
        }
        fn set_smcr(&mut self, _smcr: Smcr) {}
        fn set_enabled(&mut self, _enabled: bool) {}
        fn listen_update(&mut self, _enabled: bool) {}
        fn is_update_pending(&self) -> bool {
            self.pending.load(Ordering::Relaxed)
        }
        fn clear_update(&self) {
            self.pending.store(false, Ordering::Relaxed);
        }
        fn counter(&self) -> u16 {
            self.counter.load(Ordering::Relaxed) as u16
        }
        fn set_counter(&self, value: u16) {
            self.counter.store(value as u32, Ordering::Relaxed);
        }
    }

    static LAST: AtomicU32 = AtomicU32::new(0);

    fn record(name: &'static str, overflows: u32) {
        assert_eq!(name, "cnt");
        LAST.store(overflows, Ordering::Relaxed);
    }

    #[test]
    fn handler_sees_running_overflow_count() {
        static HANDLER: OverflowFn = record;
        let extension = Extension::new();
        let timer = Register::default();
        extension
            .control(false, &timer, Command::SetOverflowHandler(Some(&HANDLER)))
            .unwrap();

        for expected in 1..=3 {
            timer.pending.store(true, Ordering::Relaxed);
            extension.on_update("cnt", &timer);
            assert_eq!(LAST.load(Ordering::Relaxed), expected);
            assert!(!timer.is_update_pending());
        }

        // Without a pending flag nothing is counted or reported.
        extension.on_update("cnt", &timer);
        assert_eq!(extension.overflows(), 3);
        assert_eq!(LAST.load(Ordering::Relaxed), 3);

        timer.set_counter(5);
        assert_eq!(extension.take(&timer), 3 << 16 | 5);
        assert_eq!(extension.overflows(), 0);
    }

    #[test]
    fn reset_requires_open_counter() {
        let extension = Extension::new();
        let timer = Register::default();
        timer.set_counter(9);
        assert_eq!(
            extension.control(false, &timer, Command::Reset),
            Err(Error::NotOpen)
        );
        assert_eq!(timer.counter(), 9);

        extension.control(true, &timer, Command::Reset).unwrap();
        assert_eq!(timer.counter(), 0);
    }
}
