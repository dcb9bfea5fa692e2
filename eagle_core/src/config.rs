// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core configuration shared by all views of a context tree.

use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::model::{CommonLifetime, ModelRef};
use crate::scheduler::{Scheduler, SchedulerHandle, SignalId};

/// Errors from loading or saving a [`CoreConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    Io(std::io::Error),
    /// The file is not valid configuration JSON.
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "core config I/O failed: {e}"),
            Self::Json(e) => write!(f, "core config is malformed: {e}"),
        }
    }
}

impl core::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Plain configuration values, as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfigData {
    /// Upper bound for render threads, including the calling thread.
    pub max_render_threads: u32,
    /// Memory budget per view, in megabytes.
    pub max_megabytes_per_view: u32,
}

impl CoreConfigData {
    /// Allowed range of [`max_render_threads`](Self::max_render_threads).
    pub const RENDER_THREADS_RANGE: (u32, u32) = (1, 32);
    /// Allowed range of [`max_megabytes_per_view`](Self::max_megabytes_per_view).
    pub const MEGABYTES_PER_VIEW_RANGE: (u32, u32) = (8, 16384);

    /// Default values.
    pub const DEFAULT: Self = Self {
        max_render_threads: 8,
        max_megabytes_per_view: 512,
    };

    /// Returns a copy with every value clamped into its range.
    #[must_use]
    pub fn clamped(self) -> Self {
        let (t0, t1) = Self::RENDER_THREADS_RANGE;
        let (m0, m1) = Self::MEGABYTES_PER_VIEW_RANGE;
        Self {
            max_render_threads: self.max_render_threads.clamp(t0, t1),
            max_megabytes_per_view: self.max_megabytes_per_view.clamp(m0, m1),
        }
    }
}

impl Default for CoreConfigData {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The core configuration model.
///
/// Acquire it with [`CoreConfig::acquire`]. Every change fires
/// [`change_signal`](Self::change_signal).
#[derive(Debug)]
pub struct CoreConfig {
    data: Mutex<CoreConfigData>,
    change_signal: SignalId,
    handle: SchedulerHandle,
}

impl CoreConfig {
    /// Name the config is registered under.
    pub const NAME: &'static str = "";

    /// Returns the common instance of `root`, creating it with default values.
    pub fn acquire(root: &Context, sched: &mut Scheduler) -> ModelRef<Self> {
        let config = root.acquire(Self::NAME, true, |_, _| Self {
            data: Mutex::new(CoreConfigData::DEFAULT),
            change_signal: sched.create_signal(),
            handle: sched.handle(),
        });
        config.set_min_common_lifetime(CommonLifetime::Forever);
        config
    }

    /// Fired whenever a value changes.
    #[inline]
    #[must_use]
    pub fn change_signal(&self) -> SignalId {
        self.change_signal
    }

    /// A copy of the current values.
    #[must_use]
    pub fn get(&self) -> CoreConfigData {
        *self.data.lock()
    }

    /// Upper bound for render threads.
    #[must_use]
    pub fn max_render_threads(&self) -> u32 {
        self.data.lock().max_render_threads
    }

    /// Memory budget per view, in megabytes.
    #[must_use]
    pub fn max_megabytes_per_view(&self) -> u32 {
        self.data.lock().max_megabytes_per_view
    }

    /// Sets the render thread bound (clamped).
    pub fn set_max_render_threads(&self, n: u32) {
        let mut data = self.get();
        data.max_render_threads = n;
        self.set(data);
    }

    /// Sets the memory budget per view (clamped).
    pub fn set_max_megabytes_per_view(&self, mb: u32) {
        let mut data = self.get();
        data.max_megabytes_per_view = mb;
        self.set(data);
    }

    /// Replaces all values (clamped). Fires the change signal if anything
    /// changed.
    pub fn set(&self, data: CoreConfigData) {
        let data = data.clamped();
        let changed = {
            let mut cur = self.data.lock();
            let changed = *cur != data;
            *cur = data;
            changed
        };
        if changed {
            tracing::debug!(?data, "core config changed");
            self.handle.signal(self.change_signal);
        }
    }

    /// Parses values from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if `json` is malformed.
    pub fn load_str(&self, json: &str) -> Result<(), ConfigError> {
        let data: CoreConfigData = serde_json::from_str(json)?;
        self.set(data);
        Ok(())
    }

    /// Loads values from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(&self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }

    /// Serializes the current values to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.get())?)
    }

    /// Saves the current values to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl Drop for CoreConfig {
    fn drop(&mut self) {
        self.handle.release_signal(self.change_signal);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::scheduler::{Cycle, EngineCtx, Priority};

    #[test]
    fn acquire_is_common_and_forever() {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let a = CoreConfig::acquire(&root, &mut sched);
        let b = CoreConfig::acquire(&root, &mut sched);
        assert!(ModelRef::ptr_eq(&a, &b));
        drop(a);
        drop(b);
        assert_eq!(root.model_count(), 1, "kept forever");
        assert_eq!(root.listing()[0].lifetime, CommonLifetime::Forever);
    }

    #[test]
    fn setters_clamp_and_signal_on_change() {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let config = CoreConfig::acquire(&root, &mut sched);
        let changes = Rc::new(Cell::new(0));
        let c = Rc::clone(&changes);
        let signal = config.change_signal();
        let e = sched.create_engine(
            move |ctx: &mut EngineCtx<'_>| {
                if ctx.is_signaled(signal) {
                    c.set(c.get() + 1);
                }
                Cycle::Idle
            },
            Priority::Default,
        );
        sched.add_wake_up_signal(e, signal);

        config.set_max_render_threads(100);
        sched.do_time_slice();
        assert_eq!(config.max_render_threads(), 32);
        assert_eq!(changes.get(), 1);

        config.set_max_render_threads(32);
        sched.do_time_slice();
        assert_eq!(changes.get(), 1, "unchanged value does not signal");

        config.set_max_megabytes_per_view(1);
        sched.do_time_slice();
        assert_eq!(config.max_megabytes_per_view(), 8);
        assert_eq!(changes.get(), 2);

        sched.destroy_engine(e);
    }

    #[test]
    fn json_round_trip_with_defaults() {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let config = CoreConfig::acquire(&root, &mut sched);
        config.load_str(r#"{ "max_render_threads": 4 }"#).unwrap();
        assert_eq!(
            config.get(),
            CoreConfigData {
                max_render_threads: 4,
                max_megabytes_per_view: 512,
            }
        );
        let json = config.to_json().unwrap();
        assert!(json.contains("\"max_megabytes_per_view\": 512"));

        let err = config.load_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().starts_with("core config is malformed"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let config = CoreConfig::acquire(&root, &mut sched);
        let err = config
            .load_from(Path::new("/nonexistent/eagle/core.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
