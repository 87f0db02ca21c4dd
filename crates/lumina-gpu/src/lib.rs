//! Vulkan command and resource layer for the Lumina renderer.
//!
//! This crate provides:
//! - Physical device enumeration and selection
//! - Logical device and queue management
//! - GPU buffer resources with usage-driven capability derivation
//! - Command recording, render-pass scoping, and copy operations
//! - Fence-gated submission and frame synchronization

pub mod adapter;
pub mod buffer;
pub mod command;
pub mod device;
pub mod error;
pub mod instance;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod types;

pub use adapter::{Adapter, AdapterInfo, AdapterList, DeviceClass, GpuVendor, SelectionPolicy};
pub use buffer::{derive_buffer_usage, Buffer, BufferDescription, BufferFlags, BufferUsage};
pub use command::{CommandBufferKind, CommandRecorder, MAX_COPY_MIP_LEVELS};
pub use device::RenderDevice;
pub use error::{GpuError, Result};
pub use swapchain::{FramebufferTarget, Swapchain};
pub use sync::{
    create_fence, create_semaphore, CompletionSignal, FenceSignal, InFlightGuard, WAIT_FOREVER,
};
pub use texture::{format_aspect_mask, Texture};
pub use types::{ClearColor, CullMode, FrontFace, IndexKind, PrimitiveTopology};
