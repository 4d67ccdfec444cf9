//! Hotkey detection module
//!
//! One physical key drives the whole conversation: pressing it starts a
//! question, and pressing it again stops the recording or cuts off the
//! spoken answer. The listener runs on its own thread for the process
//! lifetime and only ever talks to the rest of the system by raising the
//! shared [`InterruptSignal`].
//!
//! Presses only count while a phase has bound the key through
//! [`HotkeyGate::bind`]. A press during Processing is dropped, so it cannot
//! leak into the next Listening or Speaking phase.
//!
//! Linux: evdev, requires the user to be in the 'input' group.
//! macOS: rdev, requires Accessibility permission.

#[cfg(target_os = "linux")]
pub mod evdev_listener;
#[cfg(target_os = "macos")]
pub mod rdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use crate::interrupt::InterruptSignal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

/// Result of waiting on a hotkey source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWait {
    /// The hotkey went down
    Pressed,
    /// The stop flag was set while waiting
    Stopped,
}

/// A blocking source of hotkey presses
pub trait HotkeySource: Send {
    /// Block until the hotkey is pressed or `stop` becomes true.
    ///
    /// Key repeats must not be reported as new presses.
    fn wait_for_press(&mut self, stop: &AtomicBool) -> Result<KeyWait, HotkeyError>;
}

/// Tracks whether any phase currently accepts the hotkey.
///
/// Owns the path from a press to the interrupt: the listener raises only
/// through [`HotkeyGate::raise_if_bound`], which holds the gate lock across
/// the raise, and unbinding clears the interrupt under that same lock. A
/// press can therefore never outlive the phase that accepted it.
#[derive(Debug, Clone)]
pub struct HotkeyGate {
    bound: Arc<Mutex<bool>>,
    interrupt: Arc<InterruptSignal>,
}

impl HotkeyGate {
    pub fn new(interrupt: Arc<InterruptSignal>) -> Self {
        Self {
            bound: Arc::new(Mutex::new(false)),
            interrupt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept presses until the returned binding is unbound or dropped
    pub fn bind(&self) -> HotkeyBinding {
        *self.lock() = true;
        HotkeyBinding { gate: self.clone() }
    }

    pub fn is_bound(&self) -> bool {
        *self.lock()
    }

    /// The interrupt this gate raises
    pub fn interrupt(&self) -> &Arc<InterruptSignal> {
        &self.interrupt
    }

    /// Raise the interrupt if a phase is bound. Returns whether it did.
    pub fn raise_if_bound(&self) -> bool {
        let bound = self.lock();
        if *bound {
            self.interrupt.raise();
        }
        *bound
    }

    fn release(&self) {
        let mut bound = self.lock();
        *bound = false;
        // Whatever the phase did not consume dies with it
        self.interrupt.clear();
    }
}

/// Subscription handle for one phase; unbinds on drop
#[derive(Debug)]
#[must_use = "dropping the binding unbinds the hotkey immediately"]
pub struct HotkeyBinding {
    gate: HotkeyGate,
}

impl HotkeyBinding {
    /// Stop accepting presses and discard any unconsumed one
    pub fn unbind(self) {
        // Drop does the work
    }
}

impl Drop for HotkeyBinding {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Background thread turning hotkey presses into interrupt raises
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl HotkeyListener {
    /// Start the listener thread.
    ///
    /// If the source fails, `shutdown` is set and the interrupt raised so
    /// the conversation does not wait forever for a key that cannot come.
    pub fn spawn(
        mut source: Box<dyn HotkeySource>,
        gate: HotkeyGate,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread_handle = thread::spawn(move || {
            tracing::debug!("Hotkey listener thread started");
            loop {
                match source.wait_for_press(&stop_flag) {
                    Ok(KeyWait::Pressed) => {
                        if gate.raise_if_bound() {
                            tracing::debug!("Hotkey pressed, raised interrupt");
                        } else {
                            tracing::debug!("Hotkey pressed outside an active phase, ignored");
                        }
                    }
                    Ok(KeyWait::Stopped) => break,
                    Err(e) => {
                        tracing::error!("Hotkey listener failed: {}; shutting down", e);
                        shutdown.store(true, Ordering::SeqCst);
                        gate.interrupt().raise();
                        break;
                    }
                }
            }
            tracing::debug!("Hotkey listener thread stopped");
        });

        Self {
            stop,
            thread_handle: Some(thread_handle),
        }
    }

    /// Stop the listener and wait for its thread to exit
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Hotkey listener thread panicked");
            }
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Create the hotkey source for this platform
#[cfg(target_os = "linux")]
pub fn create_source(config: &HotkeyConfig) -> Result<Box<dyn HotkeySource>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevSource::new(config)?))
}

/// Create the hotkey source for this platform
#[cfg(target_os = "macos")]
pub fn create_source(config: &HotkeyConfig) -> Result<Box<dyn HotkeySource>, HotkeyError> {
    Ok(Box::new(rdev_listener::RdevSource::new(config)?))
}

/// Create the hotkey source for this platform
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn create_source(_config: &HotkeyConfig) -> Result<Box<dyn HotkeySource>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "Global hotkey capture is only available on Linux and macOS".to_string(),
    ))
}
