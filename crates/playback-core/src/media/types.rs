use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame, plane, or resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether either dimension exceeds `max`.
    pub fn exceeds(self, max: u32) -> bool {
        self.width > max || self.height > max
    }
}

/// Opaque handle into a [`ResourceProvider`](super::provider::ResourceProvider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// Storage format of a plane resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceFormat {
    Rgba8888,
    Bgra8888,
    Luminance8,
    Red8,
    /// Half-float luminance, used for 9/10-bit planes.
    LuminanceF16,
}

impl ResourceFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            ResourceFormat::Rgba8888 | ResourceFormat::Bgra8888 => 32,
            ResourceFormat::Luminance8 | ResourceFormat::Red8 => 8,
            ResourceFormat::LuminanceF16 => 16,
        }
    }

    /// Tight row width in bytes for `width` pixels.
    pub fn width_in_bytes(self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() as usize).div_ceil(8)
    }
}

/// How the consumer should bind a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    #[default]
    Texture2D,
    /// Platform stream texture (e.g. a `SurfaceTexture`).
    External,
    Rectangle,
}

/// Allocation hint passed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureHint {
    #[default]
    Default,
    /// Storage is allocated once and never resized.
    Immutable,
}

/// Cross-context name for a texture. The all-zero name means "no mailbox".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mailbox(pub [u8; 16]);

impl Mailbox {
    pub const ZERO: Mailbox = Mailbox([0; 16]);

    pub fn from_u64(name: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&name.to_le_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

/// GPU fence marker. Whoever receives a resource with a token must wait on it
/// before touching the underlying storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyncToken {
    pub namespace: u32,
    pub release_count: u64,
}

impl SyncToken {
    pub const EMPTY: SyncToken = SyncToken {
        namespace: 0,
        release_count: 0,
    };

    pub fn has_data(&self) -> bool {
        self.release_count != 0
    }
}

/// A texture handed across contexts: mailbox, the fence guarding it, and the
/// target it must be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxHolder {
    pub mailbox: Mailbox,
    pub sync_token: SyncToken,
    pub texture_target: TextureTarget,
}

impl MailboxHolder {
    pub fn new(mailbox: Mailbox, sync_token: SyncToken, texture_target: TextureTarget) -> Self {
        Self {
            mailbox,
            sync_token,
            texture_target,
        }
    }
}
