//! Command/response state of a UART console
//!
//! Console controls come in groups: one sets the response patterns, one the
//! timeout, one sends a command and reads back what matched. The state they
//! share lives in a [`Console`], one per UART.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use regex::Regex;

use super::{DeviceCache, DeviceKey, DeviceShape};
use crate::error::{BusError, DriverError};
use crate::interface::Uart;

/// Time to wait for console output matching the patterns
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Whole match followed by every capture group
pub type Captures = Vec<String>;

#[derive(Debug)]
struct ConsoleState {
    patterns: Vec<Regex>,
    timeout: Duration,
    last: Option<Vec<Captures>>,
}

/// Console of one UART shared by all its controls
pub struct Console {
    uart: Arc<dyn Uart>,
    state: Mutex<ConsoleState>,
}

impl Console {
    pub fn new(uart: Arc<dyn Uart>) -> Self {
        Self {
            uart,
            state: Mutex::new(ConsoleState {
                patterns: Vec::new(),
                timeout: DEFAULT_TIMEOUT,
                last: None,
            }),
        }
    }

    /// Shared console for UART `interface` from the cache
    pub fn open(cache: &DeviceCache, interface: usize, uart: Arc<dyn Uart>) -> Result<Arc<Self>, DriverError> {
        let key = DeviceKey {
            interface,
            address: 0,
            shape: DeviceShape::Console,
        };
        cache.get_or_create(key, || Ok(Self::new(uart)))
    }

    pub fn uart(&self) -> &Arc<dyn Uart> {
        &self.uart
    }

    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.lock().timeout = timeout;
    }

    /// Patterns as a list literal, or `None`
    pub fn patterns(&self) -> String {
        let state = self.lock();
        if state.patterns.is_empty() {
            return "None".to_string();
        }
        let quoted: Vec<String> = state
            .patterns
            .iter()
            .map(|r| format!("'{}'", r.as_str()))
            .collect();
        format!("[{}]", quoted.join(", "))
    }

    /// Replace the response patterns from their textual form
    pub fn set_patterns(&self, text: &str) -> Result<(), DriverError> {
        let patterns = parse_patterns(text)?
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| DriverError::InvalidParam {
                    key: "regexp",
                    value: format!("{} ({})", p, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().patterns = patterns;
        Ok(())
    }

    /// Send `cmd`; with patterns set, keep what matched for [`Self::last_result`]
    pub fn send(&self, cmd: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        if state.patterns.is_empty() {
            state.last = None;
            drop(state);
            self.uart.exchange(cmd, Duration::ZERO)?;
            return Ok(());
        }
        let patterns = state.patterns.clone();
        let timeout = state.timeout;
        state.last = None;
        drop(state);

        let result = self.command(cmd, &patterns, timeout)?;
        self.lock().last = Some(result);
        Ok(())
    }

    /// Text form of the latest matched result, `None` if nothing was kept
    pub fn last_result(&self) -> String {
        match &self.lock().last {
            None => "None".to_string(),
            Some(results) => format!("{:?}", results),
        }
    }

    /// Send `cmd` and match `patterns` in order against its output
    pub fn command(&self, cmd: &str, patterns: &[Regex], timeout: Duration) -> Result<Vec<Captures>, DriverError> {
        let output = self.uart.exchange(cmd, timeout)?;
        log::debug!("{} console '{}' -> {:?}", self.uart.name(), cmd, output);

        let mut results = Vec::with_capacity(patterns.len());
        let mut pos = 0;
        for pattern in patterns {
            let caps = pattern
                .captures(&output[pos..])
                .ok_or_else(|| BusError::Timeout(cmd.to_string()))?;
            let groups: Captures = caps
                .iter()
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect();
            if let Some(whole) = caps.get(0) {
                pos += whole.end();
            }
            results.push(groups);
        }
        Ok(results)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse `None`, a single pattern, or a `['a', "b"]` list of patterns
fn parse_patterns(text: &str) -> Result<Vec<String>, DriverError> {
    let text = text.trim();
    if text.is_empty() || text == "None" {
        return Ok(Vec::new());
    }
    let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
        return Ok(vec![text.to_string()]);
    };

    let mut patterns = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return Err(bad_list(text));
        }
        let mut pattern = String::new();
        loop {
            match chars.next() {
                None => return Err(bad_list(text)),
                Some('\\') => {
                    if let Some(c) = chars.next() {
                        if c != quote {
                            pattern.push('\\');
                        }
                        pattern.push(c);
                    }
                }
                Some(c) if c == quote => break,
                Some(c) => pattern.push(c),
            }
        }
        patterns.push(pattern);
    }
    Ok(patterns)
}

fn bad_list(text: &str) -> DriverError {
    DriverError::InvalidParam {
        key: "regexp",
        value: text.to_string(),
    }
}
