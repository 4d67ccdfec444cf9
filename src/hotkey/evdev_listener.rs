//! evdev-based hotkey source
//!
//! Uses the Linux evdev interface to detect key presses at the kernel level.
//! This works on all Wayland compositors and on a bare console because it
//! bypasses the display server.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{HotkeySource, KeyWait};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long to sleep between device polls
const POLL_SLEEP: Duration = Duration::from_millis(5);

/// evdev-based hotkey source
pub struct EvdevSource {
    /// The key to listen for
    target_key: Key,
    /// Modifier keys that must be held
    modifier_keys: HashSet<Key>,
    /// Currently held modifiers
    active_modifiers: HashSet<Key>,
    /// Open keyboard devices, non-blocking
    devices: Vec<Device>,
    /// Target key is down (filters autorepeat)
    is_pressed: bool,
}

impl EvdevSource {
    /// Open every keyboard for the configured hotkey
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let target_key = parse_key_name(&config.key)?;

        let modifier_keys = config
            .modifiers
            .iter()
            .map(|k| parse_key_name(k))
            .collect::<Result<HashSet<_>, _>>()?;

        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        let devices: Vec<Device> = device_paths
            .iter()
            .filter_map(|path| match open_non_blocking(path) {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!("Failed to open {:?}: {}", path, e);
                    None
                }
            })
            .collect();

        if devices.is_empty() {
            return Err(HotkeyError::Evdev(
                "No keyboard devices could be opened".to_string(),
            ));
        }

        tracing::info!(
            "Listening for {:?} (with modifiers: {:?})",
            target_key,
            modifier_keys
        );

        Ok(Self {
            target_key,
            modifier_keys,
            active_modifiers: HashSet::new(),
            devices,
            is_pressed: false,
        })
    }

    /// Drain all pending events, returning true if the hotkey went down.
    ///
    /// Every event in the batch is processed so a release that arrives in
    /// the same batch as the press is not lost.
    fn drain_events(&mut self) -> bool {
        let mut pressed = false;

        for device in &mut self.devices {
            let Ok(events) = device.fetch_events() else {
                continue;
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let value = event.value();

                if self.modifier_keys.contains(&key) {
                    match value {
                        1 => {
                            self.active_modifiers.insert(key);
                        }
                        0 => {
                            self.active_modifiers.remove(&key);
                        }
                        _ => {}
                    }
                }

                if key != self.target_key {
                    continue;
                }

                match value {
                    1 if !self.is_pressed => {
                        self.is_pressed = true;
                        let modifiers_satisfied = self
                            .modifier_keys
                            .iter()
                            .all(|m| self.active_modifiers.contains(m));
                        if modifiers_satisfied {
                            pressed = true;
                        }
                    }
                    0 => self.is_pressed = false,
                    // 2 = autorepeat
                    _ => {}
                }
            }
        }

        pressed
    }
}

impl HotkeySource for EvdevSource {
    fn wait_for_press(&mut self, stop: &AtomicBool) -> Result<KeyWait, HotkeyError> {
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(KeyWait::Stopped);
            }
            if self.drain_events() {
                tracing::trace!("Hotkey down");
                return Ok(KeyWait::Pressed);
            }
            std::thread::sleep(POLL_SLEEP);
        }
    }
}

/// Open a device with O_NONBLOCK so fetch_events returns immediately
fn open_non_blocking(path: &PathBuf) -> std::io::Result<Device> {
    let device = Device::open(path)?;
    let fd = device.as_raw_fd();
    // SAFETY: fd is a valid descriptor owned by `device` for this call
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags != -1 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
    tracing::debug!("Opened device (non-blocking): {:?}", path);
    Ok(device)
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

/// Parse a key name string to evdev Key
fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    let key_name = if normalized.starts_with("KEY_") {
        normalized
    } else {
        format!("KEY_{}", normalized)
    };

    let key = match key_name.as_str() {
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_CAPSLOCK" => Key::KEY_CAPSLOCK,
        "KEY_NUMLOCK" => Key::KEY_NUMLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,

        "KEY_LEFTALT" | "KEY_LALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" | "KEY_RALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTCTRL" | "KEY_LCTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" | "KEY_RCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTSHIFT" | "KEY_LSHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" | "KEY_RSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_LEFTMETA" | "KEY_LMETA" | "KEY_SUPER" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" | "KEY_RMETA" => Key::KEY_RIGHTMETA,

        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,
        "KEY_F13" => Key::KEY_F13,
        "KEY_F14" => Key::KEY_F14,
        "KEY_F15" => Key::KEY_F15,
        "KEY_F16" => Key::KEY_F16,
        "KEY_F17" => Key::KEY_F17,
        "KEY_F18" => Key::KEY_F18,
        "KEY_F19" => Key::KEY_F19,
        "KEY_F20" => Key::KEY_F20,
        "KEY_F21" => Key::KEY_F21,
        "KEY_F22" => Key::KEY_F22,
        "KEY_F23" => Key::KEY_F23,
        "KEY_F24" => Key::KEY_F24,

        // Big, easy targets for small hands
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_ENTER" => Key::KEY_ENTER,
        "KEY_KPENTER" => Key::KEY_KPENTER,
        "KEY_ESC" | "KEY_ESCAPE" => Key::KEY_ESC,

        // USB foot pedals and presenter clickers
        "KEY_PAGEUP" => Key::KEY_PAGEUP,
        "KEY_PAGEDOWN" => Key::KEY_PAGEDOWN,
        "KEY_PLAYPAUSE" => Key::KEY_PLAYPAUSE,
        "KEY_RECORD" => Key::KEY_RECORD,

        _ => {
            return Err(HotkeyError::UnknownKey(format!(
                "{}. Try: SCROLLLOCK, PAUSE, SPACE, F13-F24, or run 'evtest' to find key names",
                name
            )));
        }
    };

    Ok(key)
}
