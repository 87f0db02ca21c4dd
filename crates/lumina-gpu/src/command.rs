//! Command recording and submission.

use crate::buffer::Buffer;
use crate::device::RenderDevice;
use crate::error::{GpuError, Result};
use crate::swapchain::{FramebufferTarget, Swapchain};
use crate::sync::{create_fence, FenceSignal, InFlightGuard, WAIT_FOREVER};
use crate::texture::Texture;
use crate::types::{ClearColor, CullMode, FrontFace, IndexKind, PrimitiveTopology};
use ash::vk;

/// Maximum mip levels one image copy call will record.
pub const MAX_COPY_MIP_LEVELS: u32 = 32;

/// Queue class a recorder is intended for.
///
/// The device currently exposes a single graphics queue, so every kind
/// records from the same pool and submits to the same queue;
/// [`Self::physical_queue_kind`] captures the mapping submission will use
/// once dedicated compute/transfer queues are wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBufferKind {
    #[default]
    Generic,
    AsyncGraphics,
    AsyncCompute,
    AsyncTransfer,
}

impl CommandBufferKind {
    /// Resolve the queue class actually used for submission.
    ///
    /// Async graphics runs on the compute queue only when the device has one
    /// separate from its graphics queue; otherwise it degrades to generic.
    pub fn physical_queue_kind(self, has_dedicated_compute: bool) -> Self {
        match self {
            Self::AsyncGraphics if has_dedicated_compute => Self::AsyncCompute,
            Self::AsyncGraphics => Self::Generic,
            other => other,
        }
    }
}

/// Host-tracked recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    /// No recording open; ready for `begin`.
    Idle,
    /// Between `begin` and `close`, outside a render pass.
    Recording,
    /// Between `begin_framebuffer` and `close`.
    RenderPass,
    /// Between `close` and `submit`.
    Ended,
}

impl RecordingState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::RenderPass => "recording render pass",
            Self::Ended => "ended",
        }
    }
}

/// Transition checker for the recorder state machine.
///
/// Violations are surfaced as [`GpuError::InvalidRecordingState`]; the
/// recorder makes no attempt at rollback or recovery once a transition has
/// been rejected.
#[derive(Debug)]
struct StateTracker {
    state: RecordingState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
        }
    }

    fn violation(&self, expected: &'static str) -> GpuError {
        GpuError::InvalidRecordingState {
            expected,
            actual: self.state.name(),
        }
    }

    /// Read-only validation of `begin`. Callers with fallible begin work
    /// (image acquire, fence wait) check first and commit with
    /// [`Self::begin`] only once that work has succeeded.
    fn check_begin(&self) -> Result<()> {
        match self.state {
            RecordingState::Idle | RecordingState::Ended => Ok(()),
            _ => Err(self.violation("idle or ended")),
        }
    }

    /// `Idle`/`Ended` -> `Recording`. Re-entrant begin is invalid.
    fn begin(&mut self) -> Result<()> {
        self.check_begin()?;
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// `Recording` -> `RenderPass`.
    fn begin_render_pass(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Recording => {
                self.state = RecordingState::RenderPass;
                Ok(())
            }
            _ => Err(self.violation("recording")),
        }
    }

    /// Copies and fills record outside any render pass.
    fn require_transfer(&self) -> Result<()> {
        match self.state {
            RecordingState::Recording => Ok(()),
            _ => Err(self.violation("recording")),
        }
    }

    /// Dynamic state and binds record in either recording state.
    fn require_recording(&self) -> Result<()> {
        match self.state {
            RecordingState::Recording | RecordingState::RenderPass => Ok(()),
            _ => Err(self.violation("recording")),
        }
    }

    /// Draws record inside an open render pass.
    fn require_render_pass(&self) -> Result<()> {
        match self.state {
            RecordingState::RenderPass => Ok(()),
            _ => Err(self.violation("recording render pass")),
        }
    }

    /// `Recording`/`RenderPass` -> `Ended`; returns whether a render pass
    /// was open. Closing without one is skip-safe.
    fn close(&mut self) -> Result<bool> {
        match self.state {
            RecordingState::Recording => {
                self.state = RecordingState::Ended;
                Ok(false)
            }
            RecordingState::RenderPass => {
                self.state = RecordingState::Ended;
                Ok(true)
            }
            _ => Err(self.violation("recording")),
        }
    }

    /// `Ended` -> `Idle`.
    fn submit(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Ended => {
                self.state = RecordingState::Idle;
                Ok(())
            }
            _ => Err(self.violation("ended")),
        }
    }
}

/// Records a linear sequence of GPU operations into a replayable unit.
///
/// Created once and reused every frame. `begin` blocks on the recorder's own
/// completion fence from the previous use, so at most one submission per
/// recorder is ever in flight.
pub struct CommandRecorder {
    kind: CommandBufferKind,
    command_buffer: vk::CommandBuffer,
    in_flight: InFlightGuard<FenceSignal>,
    /// Valid from `begin` until the next `begin`.
    image_index: Option<u32>,
    state: StateTracker,
}

impl CommandRecorder {
    /// Allocate a primary command buffer and its completion fence.
    ///
    /// The fence starts signaled so the first `begin` does not wait.
    pub fn new(device: &RenderDevice, kind: CommandBufferKind) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info)?[0] };

        let fence = unsafe { create_fence(&device.device, true)? };
        let in_flight = InFlightGuard::new(FenceSignal::new(device.device.clone(), fence));

        Ok(Self {
            kind,
            command_buffer,
            in_flight,
            image_index: None,
            state: StateTracker::new(),
        })
    }

    /// Queue class this recorder was created for.
    pub fn kind(&self) -> CommandBufferKind {
        self.kind
    }

    /// Get the native command buffer handle.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Swapchain image index acquired by the current begin cycle.
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// Acquire the next swapchain image and open the command buffer,
    /// waiting without bound for both the image and the previous submission.
    pub fn begin(&mut self, device: &RenderDevice, swapchain: &Swapchain) -> Result<()> {
        self.begin_with_timeout(device, swapchain, WAIT_FOREVER)
    }

    /// `begin` with an explicit timeout on both waits.
    pub fn begin_with_timeout(
        &mut self,
        device: &RenderDevice,
        swapchain: &Swapchain,
        timeout_ns: u64,
    ) -> Result<()> {
        self.state.check_begin()?;

        let index =
            unsafe { swapchain.acquire_next_image(device.image_available, timeout_ns)? };

        self.open(device, timeout_ns)?;

        // Commit only after the fallible work; a failed acquire or fence
        // wait leaves the recorder idle and retryable.
        self.state.begin()?;
        self.image_index = Some(index);

        Ok(())
    }

    /// Open the command buffer without acquiring a swapchain image.
    ///
    /// For transfer or offscreen work. A detached cycle submits without
    /// touching the frame semaphores, and render passes it opens target the
    /// first framebuffer.
    pub fn begin_detached(&mut self, device: &RenderDevice, timeout_ns: u64) -> Result<()> {
        self.state.check_begin()?;
        self.open(device, timeout_ns)?;
        self.state.begin()?;
        self.image_index = None;

        Ok(())
    }

    /// Wait out the previous submission and put the native command buffer
    /// into the recording state.
    fn open(&mut self, device: &RenderDevice, timeout_ns: u64) -> Result<()> {
        self.in_flight.acquire(timeout_ns)?;

        // Re-begin implicitly resets; the pool was created resettable.
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .device
                .begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        Ok(())
    }

    /// Open a render pass against the framebuffer selected by the acquired
    /// image index, clearing color and depth/stencil attachments.
    pub fn begin_framebuffer(
        &mut self,
        device: &RenderDevice,
        target: &FramebufferTarget,
        clear_color: ClearColor,
    ) -> Result<()> {
        self.state.begin_render_pass()?;

        let image_index = self.image_index.unwrap_or(0);
        let framebuffer = target.framebuffer(image_index)?;

        // Both attachments are cleared on load: color first, then depth.
        let clear_values = [
            vk::ClearValue {
                color: clear_color.into(),
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let extent = device.backbuffer_extent();
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(())
    }

    // ---- Copies and fills (outside render passes) ----

    /// Record a full copy between two buffers of equal declared size.
    pub fn copy_buffer(&self, device: &RenderDevice, dst: &Buffer, src: &Buffer) -> Result<()> {
        self.state.require_transfer()?;
        check_copy_sizes(dst.size_in_bytes(), src.size_in_bytes())?;

        self.copy_buffer_region(device, dst, 0, src, 0, dst.size_in_bytes())
    }

    /// Record a copy of `size` bytes between buffer ranges.
    pub fn copy_buffer_region(
        &self,
        device: &RenderDevice,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.state.require_transfer()?;

        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };

        unsafe {
            device
                .device
                .cmd_copy_buffer(self.command_buffer, src.handle(), dst.handle(), &[region]);
        }

        Ok(())
    }

    /// Record a fill of the whole buffer with a repeated 32-bit value.
    pub fn fill_buffer(&self, device: &RenderDevice, dst: &Buffer, value: u32) -> Result<()> {
        self.state.require_transfer()?;

        unsafe {
            device
                .device
                .cmd_fill_buffer(self.command_buffer, dst.handle(), 0, vk::WHOLE_SIZE, value);
        }

        Ok(())
    }

    /// Record a whole-image copy across the source's mip chain.
    pub fn copy_texture(&self, device: &RenderDevice, dst: &Texture, src: &Texture) -> Result<()> {
        self.state.require_transfer()?;

        let regions = mip_copy_regions(dst, src)?;

        unsafe {
            device.device.cmd_copy_image(
                self.command_buffer,
                src.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
        }

        Ok(())
    }

    /// Record a level-0 copy of buffer contents into an image.
    pub fn copy_buffer_to_texture(
        &self,
        device: &RenderDevice,
        dst: &Texture,
        src: &Buffer,
    ) -> Result<()> {
        self.state.require_transfer()?;

        let region = full_image_region(dst);
        unsafe {
            device.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src.handle(),
                dst.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        Ok(())
    }

    /// Record a level-0 copy of an image into a buffer.
    pub fn copy_texture_to_buffer(
        &self,
        device: &RenderDevice,
        dst: &Buffer,
        src: &Texture,
    ) -> Result<()> {
        self.state.require_transfer()?;

        let region = full_image_region(src);
        unsafe {
            device.device.cmd_copy_image_to_buffer(
                self.command_buffer,
                src.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.handle(),
                &[region],
            );
        }

        Ok(())
    }

    // ---- Dynamic state ----

    /// Record the dynamic viewport.
    #[allow(clippy::too_many_arguments)]
    pub fn set_viewport(
        &self,
        device: &RenderDevice,
        width: f32,
        height: f32,
        x: f32,
        y: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> Result<()> {
        self.state.require_recording()?;

        let viewport = vk::Viewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        };
        unsafe {
            device
                .device
                .cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }

        Ok(())
    }

    /// Record the dynamic scissor rectangle.
    pub fn set_scissor(
        &self,
        device: &RenderDevice,
        width: u32,
        height: u32,
        x: i32,
        y: i32,
    ) -> Result<()> {
        self.state.require_recording()?;

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x, y },
            extent: vk::Extent2D { width, height },
        };
        unsafe {
            device
                .device
                .cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }

        Ok(())
    }

    /// Record the dynamic cull mode.
    pub fn set_cull_mode(&self, device: &RenderDevice, mode: CullMode) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device
                .device
                .cmd_set_cull_mode(self.command_buffer, mode.into());
        }
        Ok(())
    }

    /// Record the dynamic line width.
    pub fn set_line_width(&self, device: &RenderDevice, line_width: f32) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device
                .device
                .cmd_set_line_width(self.command_buffer, line_width);
        }
        Ok(())
    }

    /// Record the dynamic front-face winding.
    pub fn set_front_face(&self, device: &RenderDevice, front_face: FrontFace) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device
                .device
                .cmd_set_front_face(self.command_buffer, front_face.into());
        }
        Ok(())
    }

    /// Record the dynamic primitive topology.
    pub fn set_primitive_topology(
        &self,
        device: &RenderDevice,
        topology: PrimitiveTopology,
    ) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device
                .device
                .cmd_set_primitive_topology(self.command_buffer, topology.into());
        }
        Ok(())
    }

    // ---- Binding ----

    /// Bind one vertex buffer at binding slot 0.
    pub fn set_vertex_buffer(
        &self,
        device: &RenderDevice,
        buffer: &Buffer,
        offset: u64,
    ) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                0,
                &[buffer.handle()],
                &[offset],
            );
        }
        Ok(())
    }

    /// Bind several vertex buffers as an array at binding slot 0.
    pub fn set_vertex_buffers(
        &self,
        device: &RenderDevice,
        buffers: &[&Buffer],
        offset: u64,
    ) -> Result<()> {
        self.state.require_recording()?;

        let handles: Vec<vk::Buffer> = buffers.iter().map(|b| b.handle()).collect();
        let offsets = vec![offset; handles.len()];
        unsafe {
            device
                .device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &handles, &offsets);
        }
        Ok(())
    }

    /// Bind an index buffer; a null buffer handle leaves the binding alone.
    pub fn set_index_buffer(
        &self,
        device: &RenderDevice,
        buffer: &Buffer,
        offset: u64,
        kind: IndexKind,
    ) -> Result<()> {
        self.state.require_recording()?;

        if buffer.handle() == vk::Buffer::null() {
            return Ok(());
        }

        unsafe {
            device.device.cmd_bind_index_buffer(
                self.command_buffer,
                buffer.handle(),
                offset,
                kind.into(),
            );
        }
        Ok(())
    }

    /// Bind one descriptor set at set index 0 of the graphics bind point.
    pub fn bind_descriptor_set(
        &self,
        device: &RenderDevice,
        descriptor_set: vk::DescriptorSet,
        pipeline_layout: vk::PipelineLayout,
    ) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    /// Bind a graphics pipeline.
    pub fn set_graphics_pipeline(
        &self,
        device: &RenderDevice,
        pipeline: vk::Pipeline,
    ) -> Result<()> {
        self.state.require_recording()?;
        unsafe {
            device.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
        Ok(())
    }

    // ---- Draws ----

    /// Record a non-indexed draw. Bound state is the backend's concern.
    pub fn draw(
        &self,
        device: &RenderDevice,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.state.require_render_pass()?;
        unsafe {
            device.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    /// Record an indexed draw.
    pub fn draw_indexed(
        &self,
        device: &RenderDevice,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.state.require_render_pass()?;
        unsafe {
            device.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    // ---- End of recording ----

    /// End the open render pass, if any, and end recording.
    pub fn close(&mut self, device: &RenderDevice) -> Result<()> {
        let had_render_pass = self.state.close()?;

        unsafe {
            if had_render_pass {
                device.device.cmd_end_render_pass(self.command_buffer);
            }
            device.device.end_command_buffer(self.command_buffer)?;
        }

        Ok(())
    }

    /// Submit the recorded commands to the graphics queue.
    ///
    /// A cycle that acquired a swapchain image waits on the device's
    /// image-available semaphore at the color-attachment-output stage and
    /// signals its render-finished semaphore. The recorder's own fence is
    /// signaled on completion; the next `begin` waits on it.
    pub fn submit(&mut self, device: &RenderDevice) -> Result<()> {
        self.state.submit()?;

        let command_buffers = [self.command_buffer];
        let wait_semaphores = [device.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [device.render_finished];

        let mut submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if self.image_index.is_some() {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal_semaphores);
        }

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info],
                self.in_flight.signal().fence(),
            )?;
        }

        Ok(())
    }

    /// Block until the last submission from this recorder completes.
    ///
    /// Leaves the completion fence armed for reuse, exactly as `begin` would.
    pub fn wait_completion(&self, timeout_ns: u64) -> Result<()> {
        self.in_flight.acquire(timeout_ns)
    }

    /// Destroy the fence and return the command buffer to the pool.
    ///
    /// # Safety
    /// The recorder must not have a submission in flight.
    pub unsafe fn destroy(&self, device: &RenderDevice) {
        self.in_flight.signal().destroy();
        device
            .device
            .free_command_buffers(device.command_pool, &[self.command_buffer]);
    }
}

/// Copies refuse silent truncation: sizes must match exactly.
fn check_copy_sizes(dst_size: u64, src_size: u64) -> Result<()> {
    if dst_size != src_size {
        return Err(GpuError::PreconditionViolation(format!(
            "copy size mismatch: destination is {dst_size} bytes, source is {src_size} bytes"
        )));
    }
    Ok(())
}

/// Build one copy region per source mip level.
///
/// Extents halve per level from the source's level-0 dimensions. The
/// destination must carry at least as many levels, and aspect masks must
/// match level for level.
fn mip_copy_regions(dst: &Texture, src: &Texture) -> Result<Vec<vk::ImageCopy>> {
    let levels = src.mip_levels();

    if levels > MAX_COPY_MIP_LEVELS {
        return Err(GpuError::PreconditionViolation(format!(
            "image copy spans {levels} mip levels; at most {MAX_COPY_MIP_LEVELS} per call"
        )));
    }
    if dst.mip_levels() < levels {
        return Err(GpuError::PreconditionViolation(format!(
            "destination has {} mip levels, source copy needs {levels}",
            dst.mip_levels(),
        )));
    }
    if src.aspect_mask() != dst.aspect_mask() {
        return Err(GpuError::PreconditionViolation(format!(
            "aspect mask mismatch: source {:?}, destination {:?}",
            src.aspect_mask(),
            dst.aspect_mask(),
        )));
    }

    let regions = (0..levels)
        .map(|level| vk::ImageCopy {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: src.aspect_mask(),
                mip_level: level,
                base_array_layer: 0,
                layer_count: src.array_layers(),
            },
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect_mask(),
                mip_level: level,
                base_array_layer: 0,
                layer_count: dst.array_layers(),
            },
            src_offset: vk::Offset3D::default(),
            dst_offset: vk::Offset3D::default(),
            extent: src.mip_extent(level),
        })
        .collect();

    Ok(regions)
}

/// Single level-0 whole-image region for buffer/image copies.
fn full_image_region(texture: &Texture) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: texture.aspect_mask(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: texture.array_layers(),
        },
        image_offset: vk::Offset3D::default(),
        image_extent: texture.extent(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(format: vk::Format, size: u32, mip_levels: u32) -> Texture {
        Texture::from_raw(
            vk::Image::null(),
            format,
            vk::Extent3D {
                width: size,
                height: size,
                depth: 1,
            },
            mip_levels,
            1,
        )
    }

    #[test]
    fn async_graphics_degrades_without_dedicated_compute() {
        assert_eq!(
            CommandBufferKind::AsyncGraphics.physical_queue_kind(false),
            CommandBufferKind::Generic
        );
        assert_eq!(
            CommandBufferKind::AsyncGraphics.physical_queue_kind(true),
            CommandBufferKind::AsyncCompute
        );
        assert_eq!(
            CommandBufferKind::AsyncTransfer.physical_queue_kind(true),
            CommandBufferKind::AsyncTransfer
        );
    }

    #[test]
    fn copy_size_mismatch_is_rejected() {
        assert!(check_copy_sizes(256, 256).is_ok());
        assert!(matches!(
            check_copy_sizes(256, 128),
            Err(GpuError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn mip_regions_halve_per_level() {
        let src = texture(vk::Format::R8G8B8A8_UNORM, 16, 5);
        let dst = texture(vk::Format::R8G8B8A8_UNORM, 16, 5);

        let regions = mip_copy_regions(&dst, &src).unwrap();
        assert_eq!(regions.len(), 5);
        assert_eq!(regions[0].extent.width, 16);
        assert_eq!(regions[1].extent.width, 8);
        assert_eq!(regions[4].extent.width, 1);
        for (level, region) in regions.iter().enumerate() {
            assert_eq!(region.src_subresource.mip_level, level as u32);
            assert_eq!(region.dst_subresource.mip_level, level as u32);
        }
    }

    #[test]
    fn mip_regions_reject_aspect_mismatch() {
        let src = texture(vk::Format::R8G8B8A8_UNORM, 16, 1);
        let dst = texture(vk::Format::D32_SFLOAT, 16, 1);

        assert!(matches!(
            mip_copy_regions(&dst, &src),
            Err(GpuError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn mip_regions_reject_oversized_chains() {
        let src = texture(vk::Format::R8G8B8A8_UNORM, 16, MAX_COPY_MIP_LEVELS + 1);
        let dst = texture(vk::Format::R8G8B8A8_UNORM, 16, MAX_COPY_MIP_LEVELS + 1);

        assert!(mip_copy_regions(&dst, &src).is_err());
    }

    #[test]
    fn mip_regions_reject_short_destination() {
        let src = texture(vk::Format::R8G8B8A8_UNORM, 16, 4);
        let dst = texture(vk::Format::R8G8B8A8_UNORM, 16, 2);

        assert!(mip_copy_regions(&dst, &src).is_err());
    }

    #[test]
    fn state_machine_walks_a_full_frame() {
        let mut state = StateTracker::new();

        state.begin().unwrap();
        state.require_transfer().unwrap();
        state.begin_render_pass().unwrap();
        state.require_recording().unwrap();
        state.require_render_pass().unwrap();
        assert!(state.close().unwrap(), "render pass was open");
        state.submit().unwrap();

        // Reusable after submit.
        state.begin().unwrap();
    }

    #[test]
    fn close_without_render_pass_is_skip_safe() {
        let mut state = StateTracker::new();

        state.begin().unwrap();
        assert!(!state.close().unwrap());
        state.submit().unwrap();
    }

    #[test]
    fn failed_begin_leaves_recorder_reusable() {
        let mut state = StateTracker::new();

        // A begin whose image acquire or fence wait fails validates the
        // state but never commits the transition.
        state.check_begin().unwrap();

        // The recorder stays idle: close on a never-begun command buffer is
        // rejected and a retried begin goes through.
        assert!(state.close().is_err());
        state.begin().unwrap();
        state.close().unwrap();
    }

    #[test]
    fn double_begin_is_rejected() {
        let mut state = StateTracker::new();

        state.begin().unwrap();
        assert!(matches!(
            state.begin(),
            Err(GpuError::InvalidRecordingState { .. })
        ));
    }

    #[test]
    fn operations_outside_recording_are_rejected() {
        let state = StateTracker::new();
        assert!(state.require_transfer().is_err());
        assert!(state.require_recording().is_err());
        assert!(state.require_render_pass().is_err());
    }

    #[test]
    fn draws_are_rejected_outside_render_pass() {
        let mut state = StateTracker::new();
        state.begin().unwrap();
        assert!(state.require_render_pass().is_err());
    }

    #[test]
    fn copies_are_rejected_inside_render_pass() {
        let mut state = StateTracker::new();
        state.begin().unwrap();
        state.begin_render_pass().unwrap();
        assert!(state.require_transfer().is_err());
    }

    #[test]
    fn close_before_begin_is_rejected() {
        let mut state = StateTracker::new();
        assert!(state.close().is_err());
    }

    #[test]
    fn submit_before_close_is_rejected() {
        let mut state = StateTracker::new();
        state.begin().unwrap();
        assert!(state.submit().is_err());
    }
}
