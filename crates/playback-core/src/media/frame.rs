//! Decoded video frames as seen by the resource updater.
//!
//! A frame is either a hole marker (overlay punch-through), a set of CPU
//! planes, or a set of GPU textures exchanged by mailbox. Every frame gets a
//! process-unique id at construction; the updater uses `(unique_id, plane)`
//! as the content identity of a plane's bytes.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use super::types::{MailboxHolder, Size, SyncToken};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4:2:0 planar, Y U V.
    I420,
    /// 4:2:0 planar, Y V U in memory.
    Yv12,
    /// 4:2:2 planar.
    Yv16,
    /// 4:4:4 planar.
    Yv24,
    /// 4:2:0 planar with a full-size alpha plane.
    I420a,
    /// 4:2:0 with interleaved UV.
    Nv12,
    Uyvy,
    Argb,
    Xrgb,
    Yuv420p9,
    Yuv420p10,
    Yuv420p12,
    Yuv422p10,
    Yuv444p10,
}

impl PixelFormat {
    pub fn num_planes(self) -> usize {
        match self {
            PixelFormat::Uyvy | PixelFormat::Argb | PixelFormat::Xrgb => 1,
            PixelFormat::Nv12 => 2,
            PixelFormat::I420a => 4,
            _ => 3,
        }
    }

    pub fn bits_per_channel(self) -> u32 {
        match self {
            PixelFormat::Yuv420p9 => 9,
            PixelFormat::Yuv420p10 | PixelFormat::Yuv422p10 | PixelFormat::Yuv444p10 => 10,
            PixelFormat::Yuv420p12 => 12,
            _ => 8,
        }
    }

    /// Formats the software upload path can handle: one sample per byte (or
    /// per native-endian u16 for high bit depth) in fully separate planes.
    pub fn is_yuv_planar(self) -> bool {
        matches!(
            self,
            PixelFormat::I420
                | PixelFormat::Yv12
                | PixelFormat::Yv16
                | PixelFormat::Yv24
                | PixelFormat::I420a
                | PixelFormat::Yuv420p9
                | PixelFormat::Yuv420p10
                | PixelFormat::Yuv420p12
                | PixelFormat::Yuv422p10
                | PixelFormat::Yuv444p10
        )
    }

    /// Bytes occupied by one element of `plane` in memory.
    pub fn bytes_per_element(self, plane: usize) -> usize {
        match self {
            PixelFormat::Argb | PixelFormat::Xrgb => 4,
            PixelFormat::Uyvy => 2,
            PixelFormat::Nv12 if plane == 1 => 2,
            _ if self.bits_per_channel() > 8 => 2,
            _ => 1,
        }
    }

    /// Horizontal and vertical subsampling factors of `plane`.
    pub fn sample_size(self, plane: usize) -> (u32, u32) {
        // Plane 0 is luma (or packed RGB); plane 3 is alpha.
        if plane == 0 || plane == 3 {
            return (1, 1);
        }
        match self {
            PixelFormat::Yv16 | PixelFormat::Yuv422p10 => (2, 1),
            PixelFormat::Yv24 | PixelFormat::Yuv444p10 => (1, 1),
            _ => (2, 2),
        }
    }

    /// Element columns and rows of `plane` for a frame of `coded_size`.
    pub fn plane_size(self, plane: usize, coded_size: Size) -> Size {
        let (sx, sy) = self.sample_size(plane);
        Size::new(
            coded_size.width.div_ceil(sx),
            coded_size.height.div_ceil(sy),
        )
    }
}

/// One CPU plane: raw bytes plus the distance between row starts.
#[derive(Debug, Clone)]
pub struct PlaneData {
    pub data: Vec<u8>,
    pub stride: usize,
}

impl PlaneData {
    pub fn new(data: Vec<u8>, stride: usize) -> Self {
        Self { data, stride }
    }

    /// Bytes of row `row`, `len` bytes long.
    pub fn row(&self, row: usize, len: usize) -> &[u8] {
        let start = row * self.stride;
        &self.data[start..start + len]
    }
}

/// Where a frame's pixels live.
#[derive(Debug)]
pub enum FrameStorage {
    /// Punch-through marker for a hardware overlay; carries no pixels.
    Hole,
    Planes(Vec<PlaneData>),
    Textures(Vec<MailboxHolder>),
}

/// Per-frame flags set by the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Textures must be copied before they leave the producer context.
    pub copy_required: bool,
    pub read_lock_fences_enabled: bool,
    pub allow_overlay: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{format:?} expects {expected} planes, got {actual}")]
    PlaneCount {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("plane {plane}: stride {stride} is narrower than its {row_bytes}-byte rows")]
    StrideTooSmall {
        plane: usize,
        stride: usize,
        row_bytes: usize,
    },
    #[error("plane {plane}: buffer holds {actual} bytes, needs {needed}")]
    PlaneTooSmall {
        plane: usize,
        actual: usize,
        needed: usize,
    },
}

/// A decoded frame, shared between the decoder, the updater, and any
/// consumer still holding one of its textures.
#[derive(Debug)]
pub struct VideoFrame {
    unique_id: u64,
    format: PixelFormat,
    coded_size: Size,
    timestamp: Duration,
    storage: FrameStorage,
    metadata: FrameMetadata,
    release_sync_token: Mutex<SyncToken>,
}

impl VideoFrame {
    fn with_storage(
        format: PixelFormat,
        coded_size: Size,
        timestamp: Duration,
        storage: FrameStorage,
    ) -> Self {
        Self {
            unique_id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            format,
            coded_size,
            timestamp,
            storage,
            metadata: FrameMetadata::default(),
            release_sync_token: Mutex::new(SyncToken::EMPTY),
        }
    }

    /// Wrap CPU planes. Validates plane count, strides, and buffer lengths.
    pub fn from_planes(
        format: PixelFormat,
        coded_size: Size,
        planes: Vec<PlaneData>,
        timestamp: Duration,
    ) -> Result<Self, FrameError> {
        if planes.len() != format.num_planes() {
            return Err(FrameError::PlaneCount {
                format,
                expected: format.num_planes(),
                actual: planes.len(),
            });
        }
        for (i, plane) in planes.iter().enumerate() {
            let size = format.plane_size(i, coded_size);
            let row_bytes = size.width as usize * format.bytes_per_element(i);
            if plane.stride < row_bytes {
                return Err(FrameError::StrideTooSmall {
                    plane: i,
                    stride: plane.stride,
                    row_bytes,
                });
            }
            let needed = match size.height as usize {
                0 => 0,
                rows => plane.stride * (rows - 1) + row_bytes,
            };
            if plane.data.len() < needed {
                return Err(FrameError::PlaneTooSmall {
                    plane: i,
                    actual: plane.data.len(),
                    needed,
                });
            }
        }
        Ok(Self::with_storage(
            format,
            coded_size,
            timestamp,
            FrameStorage::Planes(planes),
        ))
    }

    /// Wrap decoder-owned textures. Fewer holders than planes is allowed;
    /// the updater stops at the first zero mailbox.
    pub fn wrap_textures(
        format: PixelFormat,
        coded_size: Size,
        holders: Vec<MailboxHolder>,
        timestamp: Duration,
    ) -> Result<Self, FrameError> {
        if holders.is_empty() || holders.len() > format.num_planes() {
            return Err(FrameError::PlaneCount {
                format,
                expected: format.num_planes(),
                actual: holders.len(),
            });
        }
        Ok(Self::with_storage(
            format,
            coded_size,
            timestamp,
            FrameStorage::Textures(holders),
        ))
    }

    pub fn hole(coded_size: Size) -> Self {
        Self::with_storage(
            PixelFormat::Argb,
            coded_size,
            Duration::ZERO,
            FrameStorage::Hole,
        )
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn coded_size(&self) -> Size {
        self.coded_size
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn storage(&self) -> &FrameStorage {
        &self.storage
    }

    pub fn metadata(&self) -> FrameMetadata {
        self.metadata
    }

    pub fn is_hole(&self) -> bool {
        matches!(self.storage, FrameStorage::Hole)
    }

    pub fn has_textures(&self) -> bool {
        matches!(self.storage, FrameStorage::Textures(_))
    }

    pub fn plane(&self, plane: usize) -> Option<&PlaneData> {
        match &self.storage {
            FrameStorage::Planes(planes) => planes.get(plane),
            _ => None,
        }
    }

    pub fn mailbox_holders(&self) -> &[MailboxHolder] {
        match &self.storage {
            FrameStorage::Textures(holders) => holders,
            _ => &[],
        }
    }

    /// Element columns and rows of `plane`.
    pub fn plane_size(&self, plane: usize) -> Size {
        self.format.plane_size(plane, self.coded_size)
    }

    /// Fence the decoder must wait on before reusing this frame's textures.
    pub fn release_sync_token(&self) -> SyncToken {
        *self
            .release_sync_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_release_sync_token(&self, token: SyncToken) {
        *self
            .release_sync_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }
}
