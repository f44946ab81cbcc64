use thiserror::Error;

use super::types::{
    Mailbox, ResourceFormat, ResourceId, Size, SyncToken, TextureHint, TextureTarget,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("provider could not allocate a {}x{} {format:?} resource", .size.width, .size.height)]
    AllocationFailed { size: Size, format: ResourceFormat },
    #[error("{}x{} exceeds the maximum texture size {max}", .size.width, .size.height)]
    ExceedsMaxTextureSize { size: Size, max: u32 },
    #[error("plane {plane} has an empty size")]
    EmptyPlane { plane: usize },
    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceId),
    #[error("texture copy needs a GPU context")]
    NoGpuContext,
    #[error("plane {plane} can't be uploaded as {format:?}")]
    UnsupportedUpload { plane: usize, format: ResourceFormat },
    #[error("upload to {0:?} failed")]
    UploadFailed(ResourceId),
}

/// Allocator and uploader for compositor resources.
///
/// Ids are opaque to the updater; the provider owns the storage behind them.
pub trait ResourceProvider {
    fn create_resource(
        &mut self,
        size: Size,
        hint: TextureHint,
        format: ResourceFormat,
    ) -> Result<ResourceId, ResourceError>;

    fn delete_resource(&mut self, id: ResourceId);

    /// Upload tightly packed (or 4-byte row aligned) pixels covering `size`.
    fn copy_to_resource(
        &mut self,
        id: ResourceId,
        pixels: &[u8],
        size: Size,
    ) -> Result<(), ResourceError>;

    fn texture_target(&self) -> TextureTarget {
        TextureTarget::Texture2D
    }

    /// Hint `id` was created with.
    fn texture_hint(&self, id: ResourceId) -> TextureHint;

    fn max_texture_size(&self) -> u32;

    /// Whether half-float luminance textures can be allocated.
    fn supports_half_float(&self) -> bool {
        false
    }

    /// Output format for YUV planes of the given bit depth.
    fn yuv_resource_format(&self, bits_per_channel: u32) -> ResourceFormat {
        if bits_per_channel > 8 && bits_per_channel <= 10 && self.supports_half_float() {
            ResourceFormat::LuminanceF16
        } else {
            ResourceFormat::Luminance8
        }
    }

    /// Whether the consumer is still reading the resource (software
    /// compositing only; GPU consumers synchronize through sync tokens).
    fn in_use_by_consumer(&self, _id: ResourceId) -> bool {
        false
    }
}

/// Mailbox and fence primitives of a GPU context.
pub trait GpuContext {
    /// Name `id`'s texture so another context can consume it.
    fn produce_mailbox(&mut self, id: ResourceId, target: TextureTarget) -> Mailbox;

    fn wait_sync_token(&mut self, token: &SyncToken);

    fn insert_fence_sync(&mut self) -> SyncToken;

    /// GPU-side copy of the texture named by `source` into resource `dest`.
    fn copy_texture(&mut self, source: &Mailbox, dest: ResourceId, size: Size);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        half_float: bool,
    }

    impl ResourceProvider for Fixed {
        fn create_resource(
            &mut self,
            _size: Size,
            _hint: TextureHint,
            _format: ResourceFormat,
        ) -> Result<ResourceId, ResourceError> {
            Ok(ResourceId(1))
        }

        fn delete_resource(&mut self, _id: ResourceId) {}

        fn texture_hint(&self, _id: ResourceId) -> TextureHint {
            TextureHint::Default
        }

        fn copy_to_resource(
            &mut self,
            _id: ResourceId,
            _pixels: &[u8],
            _size: Size,
        ) -> Result<(), ResourceError> {
            Ok(())
        }

        fn max_texture_size(&self) -> u32 {
            4096
        }

        fn supports_half_float(&self) -> bool {
            self.half_float
        }
    }

    #[test]
    fn yuv_format_by_bit_depth() {
        let plain = Fixed { half_float: false };
        let f16 = Fixed { half_float: true };
        assert_eq!(plain.yuv_resource_format(8), ResourceFormat::Luminance8);
        assert_eq!(plain.yuv_resource_format(10), ResourceFormat::Luminance8);
        assert_eq!(f16.yuv_resource_format(8), ResourceFormat::Luminance8);
        assert_eq!(f16.yuv_resource_format(9), ResourceFormat::LuminanceF16);
        assert_eq!(f16.yuv_resource_format(10), ResourceFormat::LuminanceF16);
        // 12-bit would lose precision in a half-float.
        assert_eq!(f16.yuv_resource_format(12), ResourceFormat::Luminance8);
    }

    #[test]
    fn error_messages() {
        let err = ResourceError::ExceedsMaxTextureSize {
            size: Size::new(9000, 10),
            max: 8192,
        };
        assert_eq!(err.to_string(), "9000x10 exceeds the maximum texture size 8192");
    }
}
