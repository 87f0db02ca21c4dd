//! GPU buffer resources.

use crate::device::RenderDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use bitflags::bitflags;

/// Declared usage class of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// GPU read/write, occasional CPU initialization.
    Default,
    /// Written once at creation, never changed.
    Immutable,
    /// Rewritten from the host every frame or nearly so.
    Dynamic,
    /// Host-visible scratch area for transfers.
    Staging,
}

bitflags! {
    /// Pipeline roles a buffer may serve.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
    }
}

/// Creation parameters for a [`Buffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferDescription {
    /// Requested size in bytes.
    pub size_in_bytes: u64,
    /// Per-element stride in bytes.
    pub stride_in_bytes: u64,
    /// Usage class, fixed at construction.
    pub usage: BufferUsage,
    /// Capability flags, fixed at construction.
    pub flags: BufferFlags,
}

/// Derive native usage bits and the access mask from a description.
///
/// Every buffer can act as a copy source. A staging buffer is a raw
/// host-visible scratch area: its access mask is host read/write and the
/// capability flags contribute nothing. For any other usage class each
/// capability flag maps to one usage bit and one access bit.
pub fn derive_buffer_usage(
    description: &BufferDescription,
) -> (vk::BufferUsageFlags, vk::AccessFlags) {
    let mut usage = vk::BufferUsageFlags::TRANSFER_SRC;
    let mut access = vk::AccessFlags::empty();

    if description.usage == BufferUsage::Staging {
        return (usage, vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE);
    }

    let flags = description.flags;
    if flags.contains(BufferFlags::VERTEX_BUFFER) {
        usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if flags.contains(BufferFlags::INDEX_BUFFER) {
        usage |= vk::BufferUsageFlags::INDEX_BUFFER;
        access |= vk::AccessFlags::INDEX_READ;
    }
    if flags.contains(BufferFlags::CONSTANT_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if flags.contains(BufferFlags::SHADER_RESOURCE) {
        usage |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
        access |= vk::AccessFlags::SHADER_READ;
    }
    if flags.contains(BufferFlags::UNORDERED_ACCESS) {
        usage |= vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
        access |= vk::AccessFlags::SHADER_WRITE;
    }

    (usage, access)
}

/// A GPU memory allocation plus metadata.
///
/// Created eagerly: allocation and binding happen in the constructor, which
/// returns a fully bound resource or an error. Host uploads go through
/// [`Buffer::set_data`]; raw mapping through [`Buffer::map`] / [`Buffer::unmap`]
/// (one matched pair per upload, not reentrant).
pub struct Buffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    access_mask: vk::AccessFlags,
    description: BufferDescription,
    /// Driver-reported allocation size; always >= the requested size.
    allocated_size: u64,
    bound: bool,
    initialized: bool,
}

impl Buffer {
    /// Create a fully bound buffer.
    pub fn new(device: &RenderDevice, description: BufferDescription) -> Result<Self> {
        if description.size_in_bytes == 0 {
            return Err(GpuError::AllocationFailed("zero-sized buffer".into()));
        }

        let (buffer, memory, access_mask, allocated_size) = create_bound(device, &description)?;

        tracing::debug!(
            "Created {:?} buffer: {} bytes requested, {} allocated",
            description.usage,
            description.size_in_bytes,
            allocated_size,
        );

        Ok(Self {
            buffer,
            memory,
            access_mask,
            description,
            allocated_size,
            bound: true,
            initialized: false,
        })
    }

    /// Get the native buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the native memory handle.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Requested size in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.description.size_in_bytes
    }

    /// Per-element stride in bytes.
    pub fn stride_in_bytes(&self) -> u64 {
        self.description.stride_in_bytes
    }

    /// Driver-reported allocation size.
    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    /// Usage class.
    pub fn usage(&self) -> BufferUsage {
        self.description.usage
    }

    /// Capability flags.
    pub fn flags(&self) -> BufferFlags {
        self.description.flags
    }

    /// Pipeline stages that may read or write this buffer.
    pub fn access_mask(&self) -> vk::AccessFlags {
        self.access_mask
    }

    /// Upload host data.
    ///
    /// `Dynamic` and `Staging` buffers accept uploads at any time. `Default`
    /// and `Immutable` buffers accept exactly one initial upload; any further
    /// call is a precondition violation.
    pub fn set_data<T: bytemuck::Pod>(&mut self, device: &RenderDevice, data: &[T]) -> Result<()> {
        match self.description.usage {
            BufferUsage::Dynamic | BufferUsage::Staging => self.upload(device, data),
            BufferUsage::Default | BufferUsage::Immutable => {
                if self.initialized {
                    return Err(GpuError::PreconditionViolation(format!(
                        "{:?} buffer already initialized; it accepts a single upload",
                        self.description.usage,
                    )));
                }
                self.upload(device, data)
            }
        }
    }

    fn upload<T: bytemuck::Pod>(&mut self, device: &RenderDevice, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > self.allocated_size {
            return Err(GpuError::PreconditionViolation(format!(
                "upload of {} bytes exceeds allocation of {} bytes",
                bytes.len(),
                self.allocated_size,
            )));
        }

        unsafe {
            let ptr = self.map(device)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            self.unmap(device);
        }

        // Idempotent re-bind; buffers are bound at creation.
        self.bind_memory(device)?;
        self.initialized = true;

        Ok(())
    }

    /// Read back the buffer contents into a host slice.
    ///
    /// Only meaningful for host-visible usage classes (`Dynamic`, `Staging`).
    pub fn read_data(&self, device: &RenderDevice, out: &mut [u8]) -> Result<()> {
        if out.len() as u64 > self.allocated_size {
            return Err(GpuError::PreconditionViolation(format!(
                "read of {} bytes exceeds allocation of {} bytes",
                out.len(),
                self.allocated_size,
            )));
        }

        unsafe {
            let ptr = self.map(device)?;
            std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), out.len());
            self.unmap(device);
        }

        Ok(())
    }

    /// Map the full allocated range and return the pointer.
    ///
    /// # Safety
    /// The caller must unmap before mapping again; double-mapping without an
    /// intervening unmap is undefined.
    pub unsafe fn map(&self, device: &RenderDevice) -> Result<*mut u8> {
        let ptr = device.device.map_memory(
            self.memory,
            0,
            self.allocated_size,
            vk::MemoryMapFlags::empty(),
        )?;
        Ok(ptr.cast())
    }

    /// Unmap the buffer memory.
    ///
    /// # Safety
    /// The memory must currently be mapped.
    pub unsafe fn unmap(&self, device: &RenderDevice) {
        device.device.unmap_memory(self.memory);
    }

    /// Bind the allocation to the buffer at offset 0.
    ///
    /// Idempotent: a buffer already bound to its memory is left untouched.
    fn bind_memory(&mut self, device: &RenderDevice) -> Result<()> {
        if self.bound {
            return Ok(());
        }

        unsafe {
            device.device.bind_buffer_memory(self.buffer, self.memory, 0)?;
        }
        self.bound = true;
        Ok(())
    }

    /// Release the native handles and re-run the full creation algorithm.
    ///
    /// Any in-flight recording referencing the old handles becomes invalid;
    /// the caller must not recreate a buffer while a recorder references it.
    pub fn recreate(&mut self, device: &RenderDevice) -> Result<()> {
        unsafe {
            self.destroy(device);
        }

        let (buffer, memory, access_mask, allocated_size) =
            create_bound(device, &self.description)?;

        self.buffer = buffer;
        self.memory = memory;
        self.access_mask = access_mask;
        self.allocated_size = allocated_size;
        self.bound = true;
        self.initialized = false;

        Ok(())
    }

    /// Destroy the buffer and free its memory.
    ///
    /// # Safety
    /// The buffer must not be referenced by any in-flight submission.
    pub unsafe fn destroy(&self, device: &RenderDevice) {
        device.device.destroy_buffer(self.buffer, None);
        device.device.free_memory(self.memory, None);
    }
}

/// Create buffer + memory, bound at offset 0.
fn create_bound(
    device: &RenderDevice,
    description: &BufferDescription,
) -> Result<(vk::Buffer, vk::DeviceMemory, vk::AccessFlags, u64)> {
    let (usage, access_mask) = derive_buffer_usage(description);

    let buffer_info = vk::BufferCreateInfo::default()
        .size(description.size_in_bytes)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device
            .device
            .create_buffer(&buffer_info, None)
            .map_err(|e| GpuError::AllocationFailed(format!("buffer creation rejected: {e}")))?
    };

    let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = device.memory_type_index(
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    );
    let memory_type_index = match memory_type_index {
        Ok(index) => index,
        Err(e) => {
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    // Allocate what the driver asks for, which may exceed the request.
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        match device.device.allocate_memory(&alloc_info, None) {
            Ok(memory) => memory,
            Err(e) => {
                device.device.destroy_buffer(buffer, None);
                return Err(GpuError::AllocationFailed(format!(
                    "memory allocation rejected: {e}"
                )));
            }
        }
    };

    unsafe {
        if let Err(e) = device.device.bind_buffer_memory(buffer, memory, 0) {
            device.device.destroy_buffer(buffer, None);
            device.device.free_memory(memory, None);
            return Err(GpuError::AllocationFailed(format!("bind rejected: {e}")));
        }
    }

    Ok((buffer, memory, access_mask, requirements.size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(usage: BufferUsage, flags: BufferFlags) -> BufferDescription {
        BufferDescription {
            size_in_bytes: 256,
            stride_in_bytes: 4,
            usage,
            flags,
        }
    }

    #[test]
    fn every_buffer_is_a_transfer_source() {
        let (usage, _) = derive_buffer_usage(&description(BufferUsage::Default, BufferFlags::empty()));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn staging_ignores_capability_flags() {
        let (usage, access) =
            derive_buffer_usage(&description(BufferUsage::Staging, BufferFlags::all()));

        assert_eq!(usage, vk::BufferUsageFlags::TRANSFER_SRC);
        assert_eq!(
            access,
            vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE
        );
    }

    #[test]
    fn vertex_and_constant_derivation_is_exact() {
        let (usage, access) = derive_buffer_usage(&description(
            BufferUsage::Dynamic,
            BufferFlags::VERTEX_BUFFER | BufferFlags::CONSTANT_BUFFER,
        ));

        assert_eq!(
            usage,
            vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            access,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ
        );
    }

    #[test]
    fn flag_table_covers_all_roles() {
        let cases = [
            (
                BufferFlags::INDEX_BUFFER,
                vk::BufferUsageFlags::INDEX_BUFFER,
                vk::AccessFlags::INDEX_READ,
            ),
            (
                BufferFlags::SHADER_RESOURCE,
                vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
                vk::AccessFlags::SHADER_READ,
            ),
            (
                BufferFlags::UNORDERED_ACCESS,
                vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
                vk::AccessFlags::SHADER_WRITE,
            ),
        ];

        for (flag, expected_usage, expected_access) in cases {
            let (usage, access) = derive_buffer_usage(&description(BufferUsage::Default, flag));
            assert_eq!(usage, vk::BufferUsageFlags::TRANSFER_SRC | expected_usage);
            assert_eq!(access, expected_access);
        }
    }
}
