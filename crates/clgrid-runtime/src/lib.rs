//! OpenCL device abstraction and dispatch plumbing for clgrid.
//!
//! [`Context`] selects and wraps a compute device (or stands in for
//! CPU-only execution), caches capability queries, and creates command
//! queues. [`ExecutionContext`] is the bundle handed to each kernel
//! dispatch — queue, optional completion-event bindings, optional shared
//! [`TimingData`] — including the series-splitting protocol for operations
//! realized as several chained launches. [`ExecGuard`] keeps profiling
//! sections balanced across early returns and unwinds.
//!
//! Everything here is single-pipeline state: sharing happens through `Rc`
//! handles, and none of the types are `Sync`. One logical pipeline owns its
//! context chain and timing store at a time; kernel execution itself is
//! asynchronous on the device and observed only through events.

pub mod context;
pub mod device;
pub mod error;
pub mod execution;
pub mod timing;

pub use context::{Context, ContextType, Queue};
pub use device::{classify_vendor, enumerate_devices, DeviceDescriptor, DeviceSpec, Vendor};
pub use error::{ConfigError, ExecError};
pub use execution::{EventList, EventSlot, ExecGuard, ExecutionContext, SharedTiming};
pub use timing::{EventHandle, EventRecord, Section, TimingData};
