//! Error types for device selection and dispatch-context preconditions.

use thiserror::Error;

/// Errors arising while selecting a compute device or creating its
/// context/queue. All of these are fatal at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed device id '{id}': expected \"cpu\" or \"<platform>:<device>\"")]
    MalformedDeviceId { id: String },

    #[error("no OpenCL platforms available")]
    NoPlatforms,

    #[error("platform index {index} out of range: {count} platform(s) available")]
    PlatformOutOfRange { index: usize, count: usize },

    #[error("device index {index} out of range: platform '{platform}' exposes {count} device(s)")]
    DeviceOutOfRange { index: usize, count: usize, platform: String },

    #[error("OpenCL {call} failed: {reason}")]
    Api { call: &'static str, reason: String },
}

/// Programming errors in the calling pipeline. These indicate misuse of the
/// dispatch protocol, not a recoverable runtime condition, and are never
/// silently ignored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    #[error("execution context is detached: no command queue is bound")]
    DetachedContext,

    #[error("queue is a CPU no-op queue: no OpenCL command queue is available")]
    NoOpQueue,

    #[error("leave() called with no open timing section")]
    NoOpenSection,
}
