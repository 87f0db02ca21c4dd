//! Logical device and queue management.

use crate::adapter::Adapter;
use crate::error::{GpuError, Result};
use crate::sync::create_semaphore;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Logical device with the shared state buffers and recorders record against.
///
/// Shared read-only by all recorders and buffer resources; command recording
/// itself is single-threaded by contract.
pub struct RenderDevice {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) command_pool: vk::CommandPool,

    // Frame-scoped semaphores shared by every recorder's acquire/submit pair.
    pub(crate) image_available: vk::Semaphore,
    pub(crate) render_finished: vk::Semaphore,

    pub(crate) backbuffer_extent: vk::Extent2D,
}

impl RenderDevice {
    /// Create the logical device, graphics queue, and frame semaphores.
    ///
    /// # Safety
    /// The instance and adapter must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        adapter: &Adapter,
        backbuffer_extent: vk::Extent2D,
    ) -> Result<Self> {
        let graphics_queue_family = find_graphics_family(instance, adapter.handle())?;

        let device = create_device(instance, adapter.handle(), graphics_queue_family)?;
        let graphics_queue = device.get_device_queue(graphics_queue_family, 0);

        let memory_properties = instance.get_physical_device_memory_properties(adapter.handle());

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = device.create_command_pool(&pool_info, None)?;

        let image_available = create_semaphore(&device)?;
        let render_finished = create_semaphore(&device)?;

        tracing::info!(
            "Created render device (graphics family {graphics_queue_family}, \
             backbuffer {}x{})",
            backbuffer_extent.width,
            backbuffer_extent.height,
        );

        Ok(Self {
            device: Arc::new(device),
            physical_device: adapter.handle(),
            memory_properties,
            graphics_queue_family,
            graphics_queue,
            command_pool,
            image_available,
            render_finished,
            backbuffer_extent,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Semaphore signaled when a swapchain image becomes available.
    pub fn image_available_semaphore(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Semaphore signaled when rendering to the current image completes.
    pub fn render_finished_semaphore(&self) -> vk::Semaphore {
        self.render_finished
    }

    /// Back-buffer dimensions render passes cover by default.
    pub fn backbuffer_extent(&self) -> vk::Extent2D {
        self.backbuffer_extent
    }

    /// Update the back-buffer dimensions after a resize.
    pub fn set_backbuffer_extent(&mut self, extent: vk::Extent2D) {
        self.backbuffer_extent = extent;
    }

    /// Find a memory type matching the driver's type bitmask and the
    /// required property flags.
    pub fn memory_type_index(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        for i in 0..self.memory_properties.memory_type_count {
            if (type_bits & (1 << i)) != 0
                && self.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
            {
                return Ok(i);
            }
        }

        Err(GpuError::AllocationFailed(format!(
            "no memory type matches bits {type_bits:#x} with properties {required:?}"
        )))
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Destroy all device-owned handles.
    ///
    /// # Safety
    /// No buffer, recorder, or submitted work may still reference the device.
    pub unsafe fn destroy(&self) {
        let _ = self.device.device_wait_idle();
        self.device.destroy_semaphore(self.image_available, None);
        self.device.destroy_semaphore(self.render_finished, None);
        self.device.destroy_command_pool(self.command_pool, None);
        self.device.destroy_device(None);
    }
}

/// Find a queue family with graphics support.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
        .ok_or_else(|| GpuError::BackendUnavailable("no graphics queue family".into()))
}

/// Device extensions requested when presenting is possible.
fn device_extensions(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Vec<&'static CStr> {
    // Headless devices (software rasterizers, compute-only setups) may not
    // expose the swapchain extension; request it only when present.
    let available = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
    };

    let has_swapchain = available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    });

    if has_swapchain {
        vec![ash::khr::swapchain::NAME]
    } else {
        tracing::warn!("Swapchain extension unavailable; device is headless");
        vec![]
    }
}

/// Create the logical device.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extensions = device_extensions(instance, physical_device);
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    // The extended dynamic state commands (cull mode, front face, topology)
    // are unconditionally core at the 1.3 instance version; no feature
    // chain is needed.
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    Ok(device)
}
