//! Physical device enumeration and selection.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Coarse device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl DeviceClass {
    fn from_vk(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }
}

/// Immutable property snapshot of one physical device.
///
/// Valid from enumeration until [`AdapterList::recreate`] re-queries it.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Device name as reported by the driver.
    pub device_name: String,
    /// PCI vendor id.
    pub vendor_id: u32,
    /// Decoded vendor.
    pub vendor: GpuVendor,
    /// Device classification.
    pub device_class: DeviceClass,
    /// Vulkan API version.
    pub api_version: u32,
    /// Driver version.
    pub driver_version: u32,
    /// Device-local memory in MB.
    pub device_local_memory_mb: u64,
}

impl AdapterInfo {
    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_class,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// One physical GPU visible to the instance.
pub struct Adapter {
    pub(crate) handle: vk::PhysicalDevice,
    info: AdapterInfo,
}

impl Adapter {
    /// Get the native physical device handle.
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Get the property snapshot.
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }
}

/// Policy deciding which enumerated adapter becomes current.
///
/// Exactly one adapter is current after enumeration, whichever policy is
/// used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Keep the last enumerated adapter.
    #[default]
    LastEnumerated,
    /// Keep the first discrete GPU, falling back to the last enumerated.
    FirstDiscrete,
    /// Keep the adapter with the most device-local memory.
    HighestDeviceMemory,
}

impl SelectionPolicy {
    /// Pick the current adapter index from a non-empty list.
    pub fn select(&self, adapters: &[Adapter]) -> Option<usize> {
        if adapters.is_empty() {
            return None;
        }

        match self {
            Self::LastEnumerated => Some(adapters.len() - 1),
            Self::FirstDiscrete => adapters
                .iter()
                .position(|a| a.info.device_class == DeviceClass::Discrete)
                .or(Some(adapters.len() - 1)),
            Self::HighestDeviceMemory => adapters
                .iter()
                .enumerate()
                .max_by_key(|(_, a)| a.info.device_local_memory_mb)
                .map(|(i, _)| i),
        }
    }
}

/// Enumerated physical devices with one current selection.
pub struct AdapterList {
    adapters: Vec<Adapter>,
    current: usize,
    policy: SelectionPolicy,
}

impl AdapterList {
    /// Enumerate physical devices and select the current adapter.
    ///
    /// # Safety
    /// The instance must be valid.
    pub unsafe fn enumerate(instance: &ash::Instance, policy: SelectionPolicy) -> Result<Self> {
        let adapters = query_adapters(instance)?;

        let current = policy
            .select(&adapters)
            .ok_or_else(|| GpuError::BackendUnavailable("no physical devices".into()))?;

        tracing::info!("Selected GPU: {}", adapters[current].info.summary());

        Ok(Self {
            adapters,
            current,
            policy,
        })
    }

    /// Re-enumerate and re-query all properties from scratch.
    ///
    /// # Safety
    /// The instance must be valid.
    pub unsafe fn recreate(&mut self, instance: &ash::Instance) -> Result<()> {
        let adapters = query_adapters(instance)?;

        self.current = self
            .policy
            .select(&adapters)
            .ok_or_else(|| GpuError::BackendUnavailable("no physical devices".into()))?;
        self.adapters = adapters;

        Ok(())
    }

    /// Get the current adapter.
    pub fn current(&self) -> &Adapter {
        &self.adapters[self.current]
    }

    /// Get all enumerated adapters.
    pub fn all(&self) -> &[Adapter] {
        &self.adapters
    }

    /// Get the selection policy in use.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }
}

/// Query all physical devices and their property snapshots.
///
/// # Safety
/// The instance must be valid.
unsafe fn query_adapters(instance: &ash::Instance) -> Result<Vec<Adapter>> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::BackendUnavailable(
            "instance reports zero physical devices".into(),
        ));
    }

    let adapters = devices
        .into_iter()
        .map(|handle| Adapter {
            handle,
            info: unsafe { query_info(instance, handle) },
        })
        .collect();

    Ok(adapters)
}

/// Read the static properties of one physical device.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn query_info(instance: &ash::Instance, device: vk::PhysicalDevice) -> AdapterInfo {
    let properties = instance.get_physical_device_properties(device);
    let memory_properties = instance.get_physical_device_memory_properties(device);

    let device_name = CStr::from_ptr(properties.device_name.as_ptr())
        .to_string_lossy()
        .into_owned();

    let device_local_memory_mb: u64 = memory_properties
        .memory_heaps
        .iter()
        .take(memory_properties.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum();

    AdapterInfo {
        device_name,
        vendor_id: properties.vendor_id,
        vendor: GpuVendor::from_vendor_id(properties.vendor_id),
        device_class: DeviceClass::from_vk(properties.device_type),
        api_version: properties.api_version,
        driver_version: properties.driver_version,
        device_local_memory_mb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, class: DeviceClass, memory_mb: u64) -> Adapter {
        Adapter {
            handle: vk::PhysicalDevice::null(),
            info: AdapterInfo {
                device_name: name.to_string(),
                vendor_id: 0x10DE,
                vendor: GpuVendor::Nvidia,
                device_class: class,
                api_version: vk::API_VERSION_1_3,
                driver_version: 0,
                device_local_memory_mb: memory_mb,
            },
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn last_enumerated_picks_last() {
        let adapters = vec![
            adapter("a", DeviceClass::Discrete, 8192),
            adapter("b", DeviceClass::Integrated, 2048),
            adapter("c", DeviceClass::Cpu, 512),
        ];
        assert_eq!(SelectionPolicy::LastEnumerated.select(&adapters), Some(2));
    }

    #[test]
    fn first_discrete_prefers_discrete() {
        let adapters = vec![
            adapter("igpu", DeviceClass::Integrated, 2048),
            adapter("dgpu", DeviceClass::Discrete, 8192),
            adapter("cpu", DeviceClass::Cpu, 512),
        ];
        assert_eq!(SelectionPolicy::FirstDiscrete.select(&adapters), Some(1));
    }

    #[test]
    fn first_discrete_falls_back_to_last() {
        let adapters = vec![
            adapter("igpu", DeviceClass::Integrated, 2048),
            adapter("cpu", DeviceClass::Cpu, 512),
        ];
        assert_eq!(SelectionPolicy::FirstDiscrete.select(&adapters), Some(1));
    }

    #[test]
    fn highest_memory_picks_largest() {
        let adapters = vec![
            adapter("small", DeviceClass::Discrete, 4096),
            adapter("big", DeviceClass::Discrete, 16384),
            adapter("mid", DeviceClass::Discrete, 8192),
        ];
        assert_eq!(
            SelectionPolicy::HighestDeviceMemory.select(&adapters),
            Some(1)
        );
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert_eq!(SelectionPolicy::LastEnumerated.select(&[]), None);
        assert_eq!(SelectionPolicy::FirstDiscrete.select(&[]), None);
        assert_eq!(SelectionPolicy::HighestDeviceMemory.select(&[]), None);
    }
}
