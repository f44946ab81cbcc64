use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::media::frame::{PixelFormat, PlaneData, VideoFrame};
use crate::media::provider::{GpuContext, ResourceError, ResourceProvider};
use crate::media::types::{
    Mailbox, ResourceFormat, ResourceId, Size, SyncToken, TextureHint, TextureTarget,
};
use crate::settings::MediaSettings;

/// Counters kept by [`MemoryResourceProvider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub created: usize,
    pub deleted: usize,
    pub uploads: usize,
    pub live: usize,
}

struct StoredResource {
    size: Size,
    format: ResourceFormat,
    hint: TextureHint,
    pixels: Vec<u8>,
}

/// Resource provider backed by host memory.
pub struct MemoryResourceProvider {
    resources: FxHashMap<ResourceId, StoredResource>,
    next_id: u32,
    max_texture_size: u32,
    half_float: bool,
    texture_target: TextureTarget,
    /// Allocations left before failures start; `None` never fails.
    allocations_left: Option<usize>,
    fail_uploads: bool,
    in_use: FxHashSet<ResourceId>,
    stats: Rc<Cell<ProviderStats>>,
}

impl MemoryResourceProvider {
    pub fn new(max_texture_size: u32) -> Self {
        Self {
            resources: FxHashMap::default(),
            next_id: 1,
            max_texture_size,
            half_float: false,
            texture_target: TextureTarget::Texture2D,
            allocations_left: None,
            fail_uploads: false,
            in_use: FxHashSet::default(),
            stats: Rc::new(Cell::new(ProviderStats::default())),
        }
    }

    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self::new(settings.max_texture_size).with_half_float(settings.allow_half_float)
    }

    pub fn with_half_float(mut self, half_float: bool) -> Self {
        self.half_float = half_float;
        self
    }

    pub fn set_texture_target(&mut self, target: TextureTarget) {
        self.texture_target = target;
    }

    pub fn stats(&self) -> ProviderStats {
        self.stats.get()
    }

    /// Shared view of the counters that outlives the provider.
    pub fn stats_handle(&self) -> Rc<Cell<ProviderStats>> {
        Rc::clone(&self.stats)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// Last uploaded bytes of `id`.
    pub fn pixels(&self, id: ResourceId) -> Option<&[u8]> {
        self.resources.get(&id).map(|r| r.pixels.as_slice())
    }

    pub fn resource_format(&self, id: ResourceId) -> Option<ResourceFormat> {
        self.resources.get(&id).map(|r| r.format)
    }

    /// Allow `count` more allocations, then fail every one after.
    pub fn fail_allocations_after(&mut self, count: usize) {
        self.allocations_left = Some(count);
    }

    /// Make every upload fail until switched off again.
    pub fn set_fail_uploads(&mut self, fail: bool) {
        self.fail_uploads = fail;
    }

    pub fn set_in_use_by_consumer(&mut self, id: ResourceId, in_use: bool) {
        if in_use {
            self.in_use.insert(id);
        } else {
            self.in_use.remove(&id);
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut ProviderStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl ResourceProvider for MemoryResourceProvider {
    fn create_resource(
        &mut self,
        size: Size,
        hint: TextureHint,
        format: ResourceFormat,
    ) -> Result<ResourceId, ResourceError> {
        if let Some(left) = self.allocations_left.as_mut() {
            if *left == 0 {
                return Err(ResourceError::AllocationFailed { size, format });
            }
            *left -= 1;
        }

        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.resources.insert(
            id,
            StoredResource {
                size,
                format,
                hint,
                pixels: Vec::new(),
            },
        );
        self.update_stats(|s| {
            s.created += 1;
            s.live += 1;
        });
        Ok(id)
    }

    fn delete_resource(&mut self, id: ResourceId) {
        if self.resources.remove(&id).is_some() {
            self.in_use.remove(&id);
            self.update_stats(|s| {
                s.deleted += 1;
                s.live -= 1;
            });
        } else {
            log::warn!("Delete of unknown {:?}", id);
        }
    }

    fn copy_to_resource(
        &mut self,
        id: ResourceId,
        pixels: &[u8],
        size: Size,
    ) -> Result<(), ResourceError> {
        let resource = self
            .resources
            .get_mut(&id)
            .ok_or(ResourceError::UnknownResource(id))?;
        debug_assert_eq!(resource.size, size);
        resource.pixels.clear();
        if self.fail_uploads {
            // Leave the resource half-written, like a device lost mid-copy.
            resource.pixels.extend_from_slice(&pixels[..pixels.len() / 2]);
            return Err(ResourceError::UploadFailed(id));
        }
        resource.pixels.extend_from_slice(pixels);
        self.update_stats(|s| s.uploads += 1);
        Ok(())
    }

    fn texture_target(&self) -> TextureTarget {
        self.texture_target
    }

    fn texture_hint(&self, id: ResourceId) -> TextureHint {
        self.resources
            .get(&id)
            .map(|r| r.hint)
            .unwrap_or_default()
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn supports_half_float(&self) -> bool {
        self.half_float
    }

    fn in_use_by_consumer(&self, id: ResourceId) -> bool {
        self.in_use.contains(&id)
    }
}

/// Sync-token namespace used by [`RecordingGpuContext`] fences.
pub const SIM_FENCE_NAMESPACE: u32 = 7;

/// GPU context that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingGpuContext {
    next_release: u64,
    next_mailbox: u64,
    waits: Vec<SyncToken>,
    copies: Vec<(Mailbox, ResourceId, Size)>,
    produced: Vec<(ResourceId, Mailbox)>,
}

impl RecordingGpuContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> &[SyncToken] {
        &self.waits
    }

    pub fn copies(&self) -> &[(Mailbox, ResourceId, Size)] {
        &self.copies
    }

    pub fn produced(&self) -> &[(ResourceId, Mailbox)] {
        &self.produced
    }

    pub fn fences_inserted(&self) -> u64 {
        self.next_release
    }
}

impl GpuContext for RecordingGpuContext {
    fn produce_mailbox(&mut self, id: ResourceId, _target: TextureTarget) -> Mailbox {
        self.next_mailbox += 1;
        // High bit keeps these apart from decoder-made names in tests.
        let mailbox = Mailbox::from_u64(self.next_mailbox | (1 << 63));
        self.produced.push((id, mailbox));
        mailbox
    }

    fn wait_sync_token(&mut self, token: &SyncToken) {
        self.waits.push(*token);
    }

    fn insert_fence_sync(&mut self) -> SyncToken {
        self.next_release += 1;
        SyncToken {
            namespace: SIM_FENCE_NAMESPACE,
            release_count: self.next_release,
        }
    }

    fn copy_texture(&mut self, source: &Mailbox, dest: ResourceId, size: Size) {
        self.copies.push((*source, dest, size));
    }
}

/// Software frame with tightly packed planes filled from `seed`. High bit
/// depth formats store native-endian `u16` samples.
pub fn synthetic_frame(format: PixelFormat, size: Size, seed: u8) -> Arc<VideoFrame> {
    let max_value = (1u32 << format.bits_per_channel()) - 1;
    let planes = (0..format.num_planes())
        .map(|plane| {
            let plane_size = format.plane_size(plane, size);
            let bytes_per_element = format.bytes_per_element(plane);
            let stride = plane_size.width as usize * bytes_per_element;
            let elements = plane_size.width as usize * plane_size.height as usize;
            let mut data = Vec::with_capacity(elements * bytes_per_element);
            for i in 0..elements {
                let value = (i as u32 * 7 + u32::from(seed) * 31 + plane as u32 * 13) % (max_value + 1);
                if bytes_per_element == 2 {
                    data.extend_from_slice(&(value as u16).to_ne_bytes());
                } else {
                    data.push(value as u8);
                }
            }
            PlaneData::new(data, stride)
        })
        .collect();

    let timestamp = Duration::from_millis(u64::from(seed) * 40);
    // Plane layout above always matches what from_planes validates.
    match VideoFrame::from_planes(format, size, planes, timestamp) {
        Ok(frame) => Arc::new(frame),
        Err(err) => {
            log::error!("Synthetic frame rejected: {}", err);
            Arc::new(VideoFrame::hole(size))
        }
    }
}
