//! Compute-device context: selection, capability queries, queue creation.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, info};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context as ClContext;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL};
use opencl3::platform::{get_platforms, Platform};
use opencl3::types::{cl_command_queue_properties, cl_device_id};

use crate::device::{classify_vendor, DeviceSpec, Vendor};
use crate::error::{ConfigError, ExecError};

/// Kind of device a [`Context`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    /// Host-only: no OpenCL platform, device, or context exists.
    Cpu,
    /// A selected OpenCL device (which may itself be a CPU device).
    OpenCl,
}

/// OpenCL handles and identity captured at selection time.
struct OclState {
    platform: Platform,
    device_id: cl_device_id,
    context: ClContext,
    platform_name: String,
    device_name: String,
    vendor: Vendor,
}

/// The selected compute device plus its memoized capability queries.
///
/// A `Context` is either CPU-only (no OpenCL state is ever touched) or bound
/// to one platform/device pair. Cloning is cheap: the OpenCL handles are
/// shared, so a context can back several library instances. The capability
/// caches are populated lazily on first query and never invalidated, since
/// device capabilities do not change after selection.
///
/// Not thread-safe: a `Context` (like everything in this crate) belongs to
/// one dispatch pipeline at a time.
#[derive(Clone)]
pub struct Context {
    kind: ContextType,
    ocl: Option<Rc<OclState>>,
    ext_cache: RefCell<HashMap<String, bool>>,
    extensions: OnceCell<String>,
}

impl Context {
    /// Create a context from a textual device id (`"cpu"` or `"P:D"`).
    pub fn new(device_id: &str) -> Result<Self, ConfigError> {
        Self::from_spec(device_id.parse()?)
    }

    /// Create a context from an already-parsed [`DeviceSpec`].
    pub fn from_spec(spec: DeviceSpec) -> Result<Self, ConfigError> {
        match spec {
            DeviceSpec::Cpu => Ok(Self::cpu()),
            DeviceSpec::OpenCl { platform, device } => Self::select(platform, device),
        }
    }

    /// The CPU-only context.
    pub fn cpu() -> Self {
        Self {
            kind: ContextType::Cpu,
            ocl: None,
            ext_cache: RefCell::new(HashMap::new()),
            extensions: OnceCell::new(),
        }
    }

    /// Adopt pre-obtained OpenCL handles, e.g. when the caller already
    /// enumerated devices or shares one `cl_context` across libraries.
    pub fn from_handles(
        context: ClContext,
        platform: Platform,
        device_id: cl_device_id,
    ) -> Result<Self, ConfigError> {
        let device = Device::new(device_id);
        let device_name = device
            .name()
            .map_err(|e| ConfigError::Api { call: "clGetDeviceInfo", reason: e.to_string() })?;
        let vendor = classify_vendor(&device.vendor().unwrap_or_default());
        let platform_name = platform.name().unwrap_or_default();
        Ok(Self::from_state(OclState {
            platform,
            device_id,
            context,
            platform_name,
            device_name,
            vendor,
        }))
    }

    fn select(platform_idx: usize, device_idx: usize) -> Result<Self, ConfigError> {
        let platforms = get_platforms()
            .map_err(|e| ConfigError::Api { call: "clGetPlatformIDs", reason: e.to_string() })?;
        if platforms.is_empty() {
            return Err(ConfigError::NoPlatforms);
        }
        let platform = *platforms.get(platform_idx).ok_or(ConfigError::PlatformOutOfRange {
            index: platform_idx,
            count: platforms.len(),
        })?;
        let platform_name = platform.name().unwrap_or_default();
        debug!("selected OpenCL platform {platform_idx}: {platform_name}");

        let device_ids = platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| ConfigError::Api { call: "clGetDeviceIDs", reason: e.to_string() })?;
        let device_id = *device_ids.get(device_idx).ok_or_else(|| ConfigError::DeviceOutOfRange {
            index: device_idx,
            count: device_ids.len(),
            platform: platform_name.clone(),
        })?;

        let device = Device::new(device_id);
        let device_name = device.name().unwrap_or_default();
        let vendor = classify_vendor(&device.vendor().unwrap_or_default());
        let context = ClContext::from_device(&device)
            .map_err(|e| ConfigError::Api { call: "clCreateContext", reason: e.to_string() })?;
        info!("created OpenCL context: {device_name} on {platform_name}");

        Ok(Self::from_state(OclState {
            platform,
            device_id,
            context,
            platform_name,
            device_name,
            vendor,
        }))
    }

    fn from_state(state: OclState) -> Self {
        Self {
            kind: ContextType::OpenCl,
            ocl: Some(Rc::new(state)),
            ext_cache: RefCell::new(HashMap::new()),
            extensions: OnceCell::new(),
        }
    }

    pub fn context_type(&self) -> ContextType {
        self.kind
    }

    pub fn is_cpu_context(&self) -> bool {
        self.kind == ContextType::Cpu
    }

    pub fn is_opencl_context(&self) -> bool {
        self.kind == ContextType::OpenCl
    }

    /// Human-readable name: `"<device> on <platform>"`, or `"CPU"` for a
    /// CPU context.
    pub fn name(&self) -> String {
        match &self.ocl {
            Some(state) => format!("{} on {}", state.device_name, state.platform_name),
            None => "CPU".to_string(),
        }
    }

    /// The selected platform handle, if any.
    pub fn platform(&self) -> Option<&Platform> {
        self.ocl.as_ref().map(|s| &s.platform)
    }

    /// The selected device, if any.
    pub fn device(&self) -> Option<Device> {
        self.ocl.as_ref().map(|s| Device::new(s.device_id))
    }

    /// The underlying OpenCL context handle, if any.
    pub fn cl_context(&self) -> Option<&ClContext> {
        self.ocl.as_ref().map(|s| &s.context)
    }

    /// Vendor family of the selected device ([`Vendor::Other`] for CPU
    /// contexts).
    pub fn vendor(&self) -> Vendor {
        self.ocl.as_ref().map_or(Vendor::Other, |s| s.vendor)
    }

    pub fn is_amd(&self) -> bool {
        self.vendor() == Vendor::Amd
    }

    pub fn is_nvidia(&self) -> bool {
        self.vendor() == Vendor::Nvidia
    }

    pub fn is_intel(&self) -> bool {
        self.vendor() == Vendor::Intel
    }

    /// Whether the device advertises the named extension.
    ///
    /// The first call per name queries the device; later calls hit the
    /// memoized map. Always `false` for CPU contexts.
    pub fn check_device_extension(&self, name: &str) -> Result<bool, ConfigError> {
        if self.is_cpu_context() {
            return Ok(false);
        }
        if let Some(&cached) = self.ext_cache.borrow().get(name) {
            return Ok(cached);
        }
        let supported = self.device_extensions()?.split_whitespace().any(|ext| ext == name);
        self.ext_cache.borrow_mut().insert(name.to_string(), supported);
        Ok(supported)
    }

    /// The raw device extensions string, fetched once and cached (empty for
    /// CPU contexts).
    pub fn device_extensions(&self) -> Result<&str, ConfigError> {
        if let Some(ext) = self.extensions.get() {
            return Ok(ext.as_str());
        }
        let fetched = match &self.ocl {
            Some(state) => Device::new(state.device_id)
                .extensions()
                .map_err(|e| ConfigError::Api { call: "clGetDeviceInfo", reason: e.to_string() })?,
            None => String::new(),
        };
        Ok(self.extensions.get_or_init(|| fetched).as_str())
    }

    /// Best-effort estimate of the device's core count.
    ///
    /// OpenCL only reports compute units, so this multiplies by a
    /// per-vendor ratio: 128 for NVIDIA, 64 for AMD, 8 for Intel GPUs.
    /// Unknown vendors get the raw compute-unit count; CPU contexts report
    /// the logical-core count. Treat the result as an approximation, not a
    /// hardware fact.
    pub fn estimated_core_count(&self) -> Result<u32, ConfigError> {
        let Some(state) = &self.ocl else {
            return Ok(std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1));
        };
        let units = Device::new(state.device_id)
            .max_compute_units()
            .map_err(|e| ConfigError::Api { call: "clGetDeviceInfo", reason: e.to_string() })?;
        Ok(match state.vendor {
            Vendor::Nvidia => 128 * units,
            Vendor::Amd => 64 * units,
            Vendor::Intel => 8 * units,
            Vendor::Other => units,
        })
    }

    /// Create a command queue on this context's device with the given
    /// property flags. CPU contexts get a no-op [`Queue`].
    pub fn make_queue(&self, props: cl_command_queue_properties) -> Result<Queue, ConfigError> {
        let Some(state) = &self.ocl else {
            return Ok(Queue::noop());
        };
        let queue = CommandQueue::create_default_with_properties(&state.context, props, 0)
            .map_err(|e| ConfigError::Api {
                call: "clCreateCommandQueueWithProperties",
                reason: e.to_string(),
            })?;
        Ok(Queue::from_cl(queue))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("kind", &self.kind)
            .field("name", &self.name())
            .finish()
    }
}

/// A command queue, or the no-op stand-in CPU contexts hand out.
///
/// Work submitted to the same queue executes in submission order; the
/// series-split protocol in the execution module relies on that.
pub struct Queue {
    inner: Option<CommandQueue>,
}

impl Queue {
    /// The queue CPU contexts return: holds no OpenCL queue at all.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Wrap an existing OpenCL command queue.
    pub fn from_cl(queue: CommandQueue) -> Self {
        Self { inner: Some(queue) }
    }

    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// The underlying OpenCL queue; fails on a no-op queue.
    pub fn cl_queue(&self) -> Result<&CommandQueue, ExecError> {
        self.inner.as_ref().ok_or(ExecError::NoOpQueue)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("noop", &self.is_noop()).finish()
    }
}
