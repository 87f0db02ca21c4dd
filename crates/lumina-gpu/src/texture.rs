//! Image resources as copy-operation targets.
//!
//! Texture creation and loading live above this layer; this module only
//! carries the metadata copy commands need.

use ash::vk;

/// An image handle plus the metadata copy regions are derived from.
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
}

impl Texture {
    /// Wrap an existing image.
    pub fn from_raw(
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent3D,
        mip_levels: u32,
        array_layers: u32,
    ) -> Self {
        Self {
            image,
            format,
            extent,
            mip_levels,
            array_layers,
        }
    }

    /// Get the native image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Level-0 dimensions.
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Number of array layers.
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// Aspect mask implied by the format.
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        format_aspect_mask(self.format)
    }

    /// Dimensions of the given mip level, halved per level and clamped to 1.
    pub fn mip_extent(&self, level: u32) -> vk::Extent3D {
        vk::Extent3D {
            width: (self.extent.width >> level).max(1),
            height: (self.extent.height >> level).max(1),
            depth: (self.extent.depth >> level).max(1),
        }
    }
}

/// Aspect mask for a format.
pub fn format_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_formats_map_to_color_aspect() {
        assert_eq!(
            format_aspect_mask(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            format_aspect_mask(vk::Format::B8G8R8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn depth_stencil_formats_map_to_their_aspects() {
        assert_eq!(
            format_aspect_mask(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            format_aspect_mask(vk::Format::S8_UINT),
            vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            format_aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn mip_extent_halves_and_clamps() {
        let texture = Texture::from_raw(
            vk::Image::null(),
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent3D {
                width: 16,
                height: 8,
                depth: 1,
            },
            5,
            1,
        );

        assert_eq!(texture.mip_extent(0).width, 16);
        assert_eq!(texture.mip_extent(1).width, 8);
        assert_eq!(texture.mip_extent(1).height, 4);
        assert_eq!(texture.mip_extent(4).width, 1);
        assert_eq!(texture.mip_extent(4).height, 1);
        assert_eq!(texture.mip_extent(4).depth, 1);
    }
}
