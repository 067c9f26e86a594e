//! Shared read cursor for byte-addressed EEPROMs

use std::sync::{Mutex, PoisonError};

use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    offset: usize,
    count: usize,
}

/// `(offset, count)` window shared by every control of one EEPROM
///
/// One control sets the window, another reads or writes through it. A
/// fresh cursor covers the whole device. The window lock is held for the
/// whole of a [`with_window`](Self::with_window) call, so multi-byte
/// transfers on one device never interleave.
#[derive(Debug)]
pub struct EepromCursor {
    size: usize,
    window: Mutex<Window>,
}

impl EepromCursor {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            window: Mutex::new(Window {
                offset: 0,
                count: size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Current `(offset, count)`
    pub fn window(&self) -> (usize, usize) {
        self.with_window(|offset, count| (offset, count))
    }

    /// Run `op` with the current window while holding the device
    pub fn with_window<T>(&self, op: impl FnOnce(usize, usize) -> T) -> T {
        let w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        op(w.offset, w.count)
    }

    /// Move the window; it must lie entirely inside the device
    pub fn set_window(&self, offset: usize, count: usize) -> Result<(), DriverError> {
        if offset >= self.size {
            return Err(DriverError::Device(format!(
                "Offset {} beyond end of {}-byte device",
                offset, self.size
            )));
        }
        let end = offset.checked_add(count);
        if count == 0 || end.map_or(true, |end| end > self.size) {
            return Err(DriverError::Device(format!(
                "Count {} at offset {} exceeds {}-byte device",
                count, offset, self.size
            )));
        }
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = Window { offset, count };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let cursor = EepromCursor::new(256);
        assert_eq!(cursor.window(), (0, 256));
        cursor.set_window(0x10, 16).unwrap();
        assert_eq!(cursor.window(), (0x10, 16));
        assert!(cursor.set_window(256, 1).is_err());
        assert!(cursor.set_window(250, 7).is_err());
        assert!(cursor.set_window(0, 0).is_err());
        assert_eq!(cursor.window(), (0x10, 16));
        cursor.set_window(255, 1).unwrap();
    }

    #[test]
    fn test_window_overflow_rejected() {
        let cursor = EepromCursor::new(256);
        assert!(cursor.set_window(1, usize::MAX).is_err());
        assert!(cursor.set_window(255, usize::MAX - 254).is_err());
        assert_eq!(cursor.window(), (0, 256));
    }
}
