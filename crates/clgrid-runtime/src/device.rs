//! Device addressing, vendor classification, and enumeration.

use std::fmt;
use std::str::FromStr;

use log::debug;
use opencl3::device::{Device, CL_DEVICE_TYPE_ALL};
use opencl3::platform::get_platforms;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Textual address of a compute device: `"cpu"` or
/// `"<platform>:<device>"` with zero-based decimal indices.
///
/// Serializes through its textual form, so `"0:1"` in a config file selects
/// the second device on the first platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    /// Host-only execution, no OpenCL device involved.
    Cpu,
    /// A specific device on a specific OpenCL platform.
    OpenCl { platform: usize, device: usize },
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::OpenCl { platform, device } => write!(f, "{platform}:{device}"),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim();
        if trimmed == "cpu" {
            return Ok(Self::Cpu);
        }
        let malformed = || ConfigError::MalformedDeviceId { id: s.to_string() };
        let (platform, device) = trimmed.split_once(':').ok_or_else(malformed)?;
        Ok(Self::OpenCl {
            platform: platform.parse().map_err(|_| malformed())?,
            device: device.parse().map_err(|_| malformed())?,
        })
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, ConfigError> {
        s.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> String {
        spec.to_string()
    }
}

/// GPU vendor families with known core-per-compute-unit ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Amd,
    Nvidia,
    Intel,
    /// Anything else, including CPU contexts.
    Other,
}

/// Classify a device or platform vendor string by substring match,
/// case-insensitively. Unrecognized vendors map to [`Vendor::Other`].
pub fn classify_vendor(name: &str) -> Vendor {
    let lower = name.to_lowercase();
    if lower.contains("advanced micro devices") || lower.contains("amd") {
        Vendor::Amd
    } else if lower.contains("nvidia") {
        Vendor::Nvidia
    } else if lower.contains("intel") {
        Vendor::Intel
    } else {
        Vendor::Other
    }
}

/// One row of [`enumerate_devices`] output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub platform_index: usize,
    pub device_index: usize,
    pub platform_name: String,
    pub device_name: String,
    pub vendor: String,
}

impl DeviceDescriptor {
    /// The [`DeviceSpec`] addressing this device.
    pub fn spec(&self) -> DeviceSpec {
        DeviceSpec::OpenCl { platform: self.platform_index, device: self.device_index }
    }
}

/// List every device on every OpenCL platform.
///
/// Fails with [`ConfigError::NoPlatforms`] when no OpenCL runtime is
/// installed; platforms whose device query fails are listed with no devices
/// rather than aborting the scan.
pub fn enumerate_devices() -> Result<Vec<DeviceDescriptor>, ConfigError> {
    let platforms = get_platforms()
        .map_err(|e| ConfigError::Api { call: "clGetPlatformIDs", reason: e.to_string() })?;
    if platforms.is_empty() {
        return Err(ConfigError::NoPlatforms);
    }

    let mut descriptors = Vec::new();
    for (platform_index, platform) in platforms.iter().enumerate() {
        let platform_name = platform.name().unwrap_or_default();
        debug!("scanning OpenCL platform {platform_index}: {platform_name}");

        let device_ids = platform.get_devices(CL_DEVICE_TYPE_ALL).unwrap_or_default();
        for (device_index, device_id) in device_ids.into_iter().enumerate() {
            let device = Device::new(device_id);
            let device_name = device.name().unwrap_or_default();
            let vendor = device.vendor().unwrap_or_default();
            debug!("found device {platform_index}:{device_index}: {device_name} ({vendor})");

            descriptors.push(DeviceDescriptor {
                platform_index,
                device_index,
                platform_name: platform_name.clone(),
                device_name,
                vendor,
            });
        }
    }
    Ok(descriptors)
}
