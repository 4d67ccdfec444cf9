//! macOS hotkey source using rdev
//!
//! Requires Accessibility permission to be granted to the terminal/app.
//! Modifiers are not supported here; only the main key is matched.

use super::{HotkeySource, KeyWait};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use rdev::{listen, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Minimum gap between two reported presses
const DEBOUNCE: Duration = Duration::from_millis(100);

/// How often the stop flag is checked while waiting
const STOP_POLL: Duration = Duration::from_millis(50);

/// rdev-based hotkey source
pub struct RdevSource {
    target_key: Key,
    presses: Option<mpsc::Receiver<()>>,
}

impl RdevSource {
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let target_key = parse_key_name(&config.key)
            .ok_or_else(|| HotkeyError::UnknownKey(config.key.clone()))?;

        if !config.modifiers.is_empty() {
            tracing::warn!("Hotkey modifiers are ignored on macOS");
        }

        Ok(Self {
            target_key,
            presses: None,
        })
    }

    /// Start the global event tap on first use.
    ///
    /// rdev's listen() blocks forever and cannot be stopped from another
    /// thread, so the tap thread is detached and outlives the source.
    fn start(&mut self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let target_key = self.target_key;

        std::thread::spawn(move || {
            let mut last_press: Option<Instant> = None;
            let mut is_down = false;

            let callback = move |event: Event| match event.event_type {
                EventType::KeyPress(key) if key == target_key => {
                    // Autorepeat arrives as repeated KeyPress without a release
                    let now = Instant::now();
                    if !is_down && outside_debounce(last_press, now) {
                        last_press = Some(now);
                        let _ = tx.send(());
                    }
                    is_down = true;
                }
                EventType::KeyRelease(key) if key == target_key => {
                    is_down = false;
                }
                _ => {}
            };

            if let Err(e) = listen(callback) {
                tracing::error!("rdev listen error: {:?}", e);
                tracing::warn!(
                    "Global hotkey capture failed. Grant Accessibility permission in \
                     System Settings > Privacy & Security > Accessibility."
                );
            }
        });

        rx
    }
}

impl HotkeySource for RdevSource {
    fn wait_for_press(&mut self, stop: &AtomicBool) -> Result<KeyWait, HotkeyError> {
        if self.presses.is_none() {
            self.presses = Some(self.start());
        }
        let Some(presses) = self.presses.as_ref() else {
            return Ok(KeyWait::Stopped);
        };

        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(KeyWait::Stopped);
            }
            match presses.recv_timeout(STOP_POLL) {
                Ok(()) => return Ok(KeyWait::Pressed),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(HotkeyError::Evdev(
                        "global event tap stopped unexpectedly".to_string(),
                    ));
                }
            }
        }
    }
}

/// True when `now` is far enough from the previous press to count
fn outside_debounce(last_press: Option<Instant>, now: Instant) -> bool {
    match last_press {
        Some(last) => now.saturating_duration_since(last) > DEBOUNCE,
        None => true,
    }
}

/// Parse a key name string to rdev Key
fn parse_key_name(name: &str) -> Option<Key> {
    let upper = name.to_uppercase();
    let name = upper.strip_prefix("KEY_").unwrap_or(&upper);

    match name {
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),

        "SCROLLLOCK" => Some(Key::ScrollLock),
        "PAUSE" => Some(Key::Pause),
        "CAPSLOCK" => Some(Key::CapsLock),
        "NUMLOCK" => Some(Key::NumLock),
        "INSERT" => Some(Key::Insert),
        "SPACE" => Some(Key::Space),
        "ENTER" | "RETURN" => Some(Key::Return),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "PAGEUP" => Some(Key::PageUp),
        "PAGEDOWN" => Some(Key::PageDown),

        "RIGHTALT" | "RIGHTOPTION" => Some(Key::AltGr),
        "RIGHTCTRL" => Some(Key::ControlRight),
        "RIGHTSHIFT" => Some(Key::ShiftRight),
        "RIGHTMETA" | "RIGHTCMD" => Some(Key::MetaRight),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key_name("F12"), Some(Key::F12));
        assert_eq!(parse_key_name("scrolllock"), Some(Key::ScrollLock));
        assert_eq!(parse_key_name("KEY_SPACE"), Some(Key::Space));
        assert_eq!(parse_key_name("NOPE"), None);
    }

    #[test]
    fn test_first_press_is_never_debounced() {
        // No arithmetic on a fresh Instant, so this holds right after boot
        assert!(outside_debounce(None, Instant::now()));
    }

    #[test]
    fn test_debounce_window() {
        let first = Instant::now();
        assert!(!outside_debounce(Some(first), first));
        assert!(!outside_debounce(Some(first), first + Duration::from_millis(50)));
        assert!(outside_debounce(Some(first), first + Duration::from_millis(150)));
        // A clock that appears to run backwards is treated as a bounce
        assert!(!outside_debounce(Some(first + Duration::from_secs(1)), first));
    }
}
