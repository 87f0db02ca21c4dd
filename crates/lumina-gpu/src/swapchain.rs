//! Swapchain and framebuffer collaborators.
//!
//! Swapchain creation and present-mode negotiation belong to the windowing
//! layer above; recorders only need image acquisition and the per-image
//! framebuffer handles, which these wrappers carry.

use crate::error::{GpuError, Result};
use ash::vk;

/// Swapchain handle plus the loader needed to drive it.
pub struct Swapchain {
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
}

impl Swapchain {
    /// Wrap an existing swapchain.
    pub fn from_raw(loader: ash::khr::swapchain::Device, handle: vk::SwapchainKHR) -> Self {
        Self { loader, handle }
    }

    /// Get the native swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Acquire the next image, signaling `semaphore` when it is usable.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<u32> {
        let (index, suboptimal) =
            self.loader
                .acquire_next_image(self.handle, timeout_ns, semaphore, vk::Fence::null())?;

        if suboptimal {
            tracing::warn!("Acquired suboptimal swapchain image {index}");
        }

        Ok(index)
    }

    /// Present an image, waiting on the given semaphores.
    ///
    /// Returns `true` when the swapchain is suboptimal or out of date and
    /// should be recreated by its owner.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match self.loader.queue_present(queue, &present_info) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }
}

/// Render pass plus one framebuffer per swapchain image.
pub struct FramebufferTarget {
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl FramebufferTarget {
    /// Wrap existing framebuffer handles.
    pub fn from_raw(
        render_pass: vk::RenderPass,
        framebuffers: Vec<vk::Framebuffer>,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            render_pass,
            framebuffers,
            extent,
        }
    }

    /// Get the render pass handle.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Framebuffer for the given swapchain image.
    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::PreconditionViolation(format!(
                    "image index {image_index} out of range ({} framebuffers)",
                    self.framebuffers.len(),
                ))
            })
    }

    /// Target dimensions.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
