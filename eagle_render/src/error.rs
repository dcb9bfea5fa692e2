// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

/// Errors from the render thread pool.
#[derive(Debug)]
pub enum PoolError {
    /// The operating system refused to start a worker thread.
    Spawn(std::io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn render thread: {e}"),
        }
    }
}

impl core::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
        }
    }
}

/// Errors from painting a view into render buffers.
#[derive(Debug)]
pub enum RenderError {
    /// The backend could not allocate its buffers.
    Prepare {
        /// Requested number of buffers.
        count: usize,
        /// Requested buffer width.
        width: u32,
        /// Requested buffer height.
        height: u32,
    },
    /// A buffer index outside the prepared range.
    NoSuchBuffer(usize),
    /// Handing a painted buffer to the output failed.
    Flush(String),
    /// The thread pool could not be resized.
    Pool(PoolError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare {
                count,
                width,
                height,
            } => write!(f, "cannot allocate {count} render buffers of {width}x{height}"),
            Self::NoSuchBuffer(i) => write!(f, "render buffer {i} was not prepared"),
            Self::Flush(reason) => write!(f, "flushing a render buffer failed: {reason}"),
            Self::Pool(e) => write!(f, "render pool: {e}"),
        }
    }
}

impl core::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Pool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for RenderError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}
