//! Frame → compositor resource conversion with a recycling plane pool.
//!
//! - Software frames are uploaded plane by plane into pooled resources
//!   (or converted to a single RGBA resource without a GPU context)
//! - Pool entries are tagged with the `(frame id, plane)` they hold, so
//!   presenting the same frame again skips the upload
//! - Texture frames are wrapped as-is, or copied into pooled RGBA resources
//!   when the frame demands it
//! - Release callbacks may fire on any thread; they post to an inbox that is
//!   drained on this side before every allocation pass

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::convert::{self, Rgba8, RowConversion};
use super::frame::{FrameStorage, PixelFormat, VideoFrame};
use super::provider::{GpuContext, ResourceError, ResourceProvider};
use super::resources::{
    ExternalResource, ExternalResourceType, ExternalResources, PlaneResource, ReleaseCallback,
    ReleaseMessage, ReleaseTarget,
};
use super::types::{
    Mailbox, MailboxHolder, ResourceFormat, ResourceId, Size, SyncToken, TextureHint,
    TextureTarget,
};

/// Presentation kind of a texture-backed frame, or `None` if unsupported.
pub fn resource_type_for_frame(format: PixelFormat, target: TextureTarget) -> ExternalResourceType {
    match format {
        PixelFormat::Argb | PixelFormat::Xrgb | PixelFormat::Uyvy => match target {
            TextureTarget::Texture2D if format == PixelFormat::Xrgb => ExternalResourceType::RgbResource,
            TextureTarget::Texture2D => ExternalResourceType::RgbaPremultipliedResource,
            TextureTarget::External => ExternalResourceType::StreamTextureResource,
            TextureTarget::Rectangle => ExternalResourceType::RgbResource,
        },
        PixelFormat::I420 => ExternalResourceType::YuvResource,
        PixelFormat::Nv12 if target == TextureTarget::Rectangle => ExternalResourceType::RgbResource,
        _ => ExternalResourceType::None,
    }
}

pub struct VideoResourceUpdater<P: ResourceProvider, G: GpuContext> {
    provider: P,
    /// `None` means software compositing.
    context: Option<G>,
    all_resources: Vec<PlaneResource>,
    /// Scratch for repacked plane rows.
    upload_pixels: Vec<u8>,
    /// Scratch for software-compositor RGBA conversion.
    rgba_pixels: Vec<Rgba8>,
    force_texture_copy: bool,
    release_tx: Sender<ReleaseMessage>,
    release_rx: Receiver<ReleaseMessage>,
}

impl<P: ResourceProvider, G: GpuContext> VideoResourceUpdater<P, G> {
    pub fn new(provider: P, context: Option<G>) -> Self {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        log::info!(
            "Video resource updater created ({} compositing)",
            if context.is_some() { "GPU" } else { "software" }
        );
        Self {
            provider,
            context,
            all_resources: Vec::new(),
            upload_pixels: Vec::new(),
            rgba_pixels: Vec::new(),
            force_texture_copy: false,
            release_tx,
            release_rx,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn context(&self) -> Option<&G> {
        self.context.as_ref()
    }

    pub fn is_software_compositor(&self) -> bool {
        self.context.is_none()
    }

    /// Copy every texture-backed frame, regardless of its metadata.
    pub fn set_force_texture_copy(&mut self, force: bool) {
        self.force_texture_copy = force;
    }

    pub fn pool_len(&self) -> usize {
        self.all_resources.len()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&PlaneResource> {
        self.all_resources.iter().find(|r| r.resource_id == id)
    }

    /// Resources currently checked out to a consumer.
    pub fn checked_out(&self) -> usize {
        self.all_resources.iter().filter(|r| r.is_referenced()).count()
    }

    pub fn create_external_resources_from_video_frame(
        &mut self,
        frame: &Arc<VideoFrame>,
    ) -> ExternalResources {
        self.process_returned_resources();

        match frame.storage() {
            FrameStorage::Hole => ExternalResources::empty(ExternalResourceType::Hole),
            FrameStorage::Textures(holders) => self.create_for_hardware_planes(frame, holders),
            FrameStorage::Planes(_) => self.create_for_software_planes(frame),
        }
    }

    /// Apply every release posted since the last drain. Returns how many
    /// were processed.
    pub fn process_returned_resources(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.release_rx.try_recv() {
            match message.target {
                ReleaseTarget::Recycle(id) => {
                    self.recycle_resource(id, message.sync_token, message.lost);
                }
                ReleaseTarget::ReturnTexture(frame) => {
                    self.return_texture(&frame, message.sync_token, message.lost);
                }
            }
            processed += 1;
        }
        processed
    }

    fn create_for_software_planes(&mut self, frame: &Arc<VideoFrame>) -> ExternalResources {
        let format = frame.format();
        if !format.is_yuv_planar() {
            log::warn!("Unsupported software frame format {:?}", format);
            return ExternalResources::none();
        }

        let software_compositor = self.context.is_none();
        let bits = format.bits_per_channel();
        let output_format = if software_compositor {
            ResourceFormat::Rgba8888
        } else {
            self.plane_resource_format(bits)
        };
        let output_plane_count = if software_compositor {
            1
        } else {
            format.num_planes()
        };

        // Drop unreferenced resources left over from another output mode.
        self.evict_mismatched(output_format);

        let frame_id = frame.unique_id();
        let mut indices = Vec::with_capacity(output_plane_count);
        for plane in 0..output_plane_count {
            let plane_size = if software_compositor {
                frame.coded_size()
            } else {
                frame.plane_size(plane)
            };
            match self.recycle_or_allocate(plane_size, output_format, frame_id, plane) {
                Ok(index) => {
                    self.all_resources[index].add_ref();
                    indices.push(index);
                }
                Err(err) => {
                    log::warn!("Dropping frame {}: {}", frame_id, err);
                    self.release_refs(&indices);
                    return ExternalResources::none();
                }
            }
        }

        if software_compositor {
            let index = indices[0];
            if let Err(err) = self.paint_rgba(frame, index) {
                log::warn!("Dropping frame {}: {}", frame_id, err);
                self.release_refs(&indices);
                return ExternalResources::none();
            }
            let resource = &self.all_resources[index];
            let mut out = ExternalResources::empty(ExternalResourceType::SoftwareResource);
            out.resources.push(ExternalResource {
                resource_id: Some(resource.resource_id),
                mailbox: Mailbox::ZERO,
                sync_token: SyncToken::EMPTY,
                target: TextureTarget::Texture2D,
                size: resource.size,
                allow_overlay: false,
            });
            out.release_callbacks.push(ReleaseCallback::new(
                self.release_tx.clone(),
                ReleaseTarget::Recycle(resource.resource_id),
            ));
            return out;
        }

        for (plane, &index) in indices.iter().enumerate() {
            if self.all_resources[index].matches_tag(frame_id, plane) {
                log::debug!("Plane {} of frame {} already resident", plane, frame_id);
                continue;
            }
            // A failed upload may leave the old contents half overwritten.
            self.all_resources[index].clear_tag();
            if let Err(err) = self.upload_plane(frame, plane, index) {
                log::warn!("Dropping frame {}: {}", frame_id, err);
                self.release_refs(&indices);
                return ExternalResources::none();
            }
            self.all_resources[index].set_tag(frame_id, plane);
        }

        let mut out = ExternalResources::empty(ExternalResourceType::YuvResource);
        if output_format == ResourceFormat::LuminanceF16 {
            let (offset, multiplier) = convert::half_float_range(bits);
            out.offset = offset;
            out.multiplier = multiplier;
        }

        let sync_token = match self.context.as_mut() {
            Some(context) => context.insert_fence_sync(),
            None => SyncToken::EMPTY,
        };
        let target = self.provider.texture_target();
        for &index in &indices {
            let resource = &self.all_resources[index];
            out.resources.push(ExternalResource {
                resource_id: Some(resource.resource_id),
                mailbox: resource.mailbox,
                sync_token,
                target,
                size: resource.size,
                allow_overlay: false,
            });
            out.release_callbacks.push(ReleaseCallback::new(
                self.release_tx.clone(),
                ReleaseTarget::Recycle(resource.resource_id),
            ));
        }
        out
    }

    /// Provider's plane format for `bits`, limited to what the upload path
    /// can produce from samples of that depth.
    fn plane_resource_format(&self, bits: u32) -> ResourceFormat {
        match self.provider.yuv_resource_format(bits) {
            ResourceFormat::Luminance8 => ResourceFormat::Luminance8,
            ResourceFormat::LuminanceF16 if bits > 8 => ResourceFormat::LuminanceF16,
            other => {
                log::warn!(
                    "Provider format {:?} can't hold {}-bit planes, using Luminance8",
                    other,
                    bits
                );
                ResourceFormat::Luminance8
            }
        }
    }

    fn create_for_hardware_planes(
        &mut self,
        frame: &Arc<VideoFrame>,
        holders: &[MailboxHolder],
    ) -> ExternalResources {
        let target = holders
            .first()
            .map(|h| h.texture_target)
            .unwrap_or_default();
        let mut kind = resource_type_for_frame(frame.format(), target);
        if kind == ExternalResourceType::None {
            log::warn!(
                "Unsupported texture frame {:?} on {:?}",
                frame.format(),
                target
            );
            return ExternalResources::none();
        }

        let metadata = frame.metadata();
        let copy = metadata.copy_required || self.force_texture_copy;
        if copy && kind == ExternalResourceType::StreamTextureResource {
            // Copies land in plain 2D textures.
            kind = ExternalResourceType::RgbResource;
        }

        let mut out = ExternalResources::empty(kind);
        out.read_lock_fences_enabled = metadata.read_lock_fences_enabled;

        let mut copied = Vec::new();
        for (plane, holder) in holders.iter().enumerate() {
            if holder.mailbox.is_zero() {
                break;
            }

            if !copy {
                out.resources.push(ExternalResource {
                    resource_id: None,
                    mailbox: holder.mailbox,
                    sync_token: holder.sync_token,
                    target: holder.texture_target,
                    size: frame.coded_size(),
                    allow_overlay: metadata.allow_overlay,
                });
                out.release_callbacks.push(ReleaseCallback::new(
                    self.release_tx.clone(),
                    ReleaseTarget::ReturnTexture(Arc::clone(frame)),
                ));
                continue;
            }

            match self.copy_plane_texture(frame, plane, holder) {
                Ok((index, sync_token)) => {
                    copied.push(index);
                    let resource = &self.all_resources[index];
                    out.resources.push(ExternalResource {
                        resource_id: Some(resource.resource_id),
                        mailbox: resource.mailbox,
                        sync_token,
                        target: TextureTarget::Texture2D,
                        size: resource.size,
                        allow_overlay: false,
                    });
                    out.release_callbacks.push(ReleaseCallback::new(
                        self.release_tx.clone(),
                        ReleaseTarget::Recycle(resource.resource_id),
                    ));
                }
                Err(err) => {
                    log::warn!("Texture copy for frame {} failed: {}", frame.unique_id(), err);
                    self.release_refs(&copied);
                    return ExternalResources::none();
                }
            }
        }
        out
    }

    /// Copy one decoder texture into a pooled RGBA resource. Returns the
    /// pool index (already ref'd) and the fence guarding the copy.
    fn copy_plane_texture(
        &mut self,
        frame: &VideoFrame,
        plane: usize,
        holder: &MailboxHolder,
    ) -> Result<(usize, SyncToken), ResourceError> {
        if self.context.is_none() {
            return Err(ResourceError::NoGpuContext);
        }
        let size = frame.plane_size(plane);
        self.check_size(size, plane)?;

        let format = ResourceFormat::Rgba8888;
        let provider = &self.provider;
        let reusable = self.all_resources.iter().position(|r| {
            r.size == size
                && r.format == format
                && !r.mailbox.is_zero()
                && !r.is_referenced()
                && provider.texture_hint(r.resource_id) != TextureHint::Immutable
        });
        let index = match reusable {
            Some(index) => index,
            None => self.allocate_resource(size, format, TextureHint::Default, true)?,
        };
        let dest = self.all_resources[index].resource_id;

        let context = self.context.as_mut().ok_or(ResourceError::NoGpuContext)?;
        context.wait_sync_token(&holder.sync_token);
        context.copy_texture(&holder.mailbox, dest, size);
        let sync_token = context.insert_fence_sync();
        // The decoder may reuse its texture once the copy has executed.
        frame.update_release_sync_token(sync_token);

        let resource = &mut self.all_resources[index];
        resource.clear_tag();
        resource.add_ref();
        Ok((index, sync_token))
    }

    fn check_size(&self, size: Size, plane: usize) -> Result<(), ResourceError> {
        if size.is_empty() {
            return Err(ResourceError::EmptyPlane { plane });
        }
        let max = self.provider.max_texture_size();
        if size.exceeds(max) {
            return Err(ResourceError::ExceedsMaxTextureSize { size, max });
        }
        Ok(())
    }

    /// Find an unreferenced pool entry for `(size, format)`, preferring one
    /// that already holds `(frame_id, plane)`, or allocate a new one.
    fn recycle_or_allocate(
        &mut self,
        size: Size,
        format: ResourceFormat,
        frame_id: u64,
        plane: usize,
    ) -> Result<usize, ResourceError> {
        self.check_size(size, plane)?;

        let software_compositor = self.context.is_none();
        let mut candidate = None;
        for (index, resource) in self.all_resources.iter().enumerate() {
            if resource.is_referenced() || resource.size != size || resource.format != format {
                continue;
            }
            if software_compositor && self.provider.in_use_by_consumer(resource.resource_id) {
                continue;
            }
            if resource.matches_tag(frame_id, plane) {
                return Ok(index);
            }
            if candidate.is_none() {
                candidate = Some(index);
            }
        }

        match candidate {
            Some(index) => Ok(index),
            None => self.allocate_resource(size, format, TextureHint::Immutable, !software_compositor),
        }
    }

    fn allocate_resource(
        &mut self,
        size: Size,
        format: ResourceFormat,
        hint: TextureHint,
        with_mailbox: bool,
    ) -> Result<usize, ResourceError> {
        let id = self.provider.create_resource(size, hint, format)?;
        let target = self.provider.texture_target();
        let mailbox = match self.context.as_mut() {
            Some(context) if with_mailbox => context.produce_mailbox(id, target),
            _ => Mailbox::ZERO,
        };
        log::debug!(
            "Allocated {:?} {}x{} {:?}",
            id,
            size.width,
            size.height,
            format
        );
        self.all_resources
            .push(PlaneResource::new(id, size, format, mailbox));
        Ok(self.all_resources.len() - 1)
    }

    fn evict_mismatched(&mut self, format: ResourceFormat) {
        let provider = &mut self.provider;
        self.all_resources.retain(|resource| {
            if resource.is_referenced() || resource.format == format {
                return true;
            }
            log::debug!(
                "Evicting {:?} ({:?}, want {:?})",
                resource.resource_id,
                resource.format,
                format
            );
            provider.delete_resource(resource.resource_id);
            false
        });
    }

    fn release_refs(&mut self, indices: &[usize]) {
        for &index in indices {
            self.all_resources[index].remove_ref();
        }
    }

    /// Software compositing: convert the whole frame into the RGBA resource
    /// at `index`, unless it already holds this frame.
    fn paint_rgba(&mut self, frame: &VideoFrame, index: usize) -> Result<(), ResourceError> {
        let frame_id = frame.unique_id();
        let resource = &self.all_resources[index];
        if resource.matches_tag(frame_id, 0) {
            return Ok(());
        }
        let (id, size) = (resource.resource_id, resource.size);
        self.all_resources[index].clear_tag();
        convert::yuv_to_rgba(frame, &mut self.rgba_pixels);
        self.provider
            .copy_to_resource(id, bytemuck::cast_slice(&self.rgba_pixels), size)?;
        self.all_resources[index].set_tag(frame_id, 0);
        Ok(())
    }

    fn upload_plane(
        &mut self,
        frame: &VideoFrame,
        plane: usize,
        index: usize,
    ) -> Result<(), ResourceError> {
        let data = frame.plane(plane).ok_or(ResourceError::EmptyPlane { plane })?;
        let resource = &self.all_resources[index];
        let (id, size, output_format) = (resource.resource_id, resource.size, resource.format);

        let format = frame.format();
        let wide_samples = format.bytes_per_element(plane) == 2;
        let conversion = match output_format {
            ResourceFormat::LuminanceF16 if wide_samples => RowConversion::HalfFloat,
            ResourceFormat::Luminance8 if wide_samples => {
                RowConversion::DownShift(format.bits_per_channel() - 8)
            }
            ResourceFormat::Luminance8 => RowConversion::Copy,
            other => {
                return Err(ResourceError::UnsupportedUpload {
                    plane,
                    format: other,
                });
            }
        };

        let rows = size.height as usize;
        let row_bytes = output_format.width_in_bytes(size.width);
        let upload_stride = convert::aligned_row_bytes(row_bytes);

        if conversion == RowConversion::Copy
            && data.stride == upload_stride
            && data.data.len() >= upload_stride * rows
        {
            return self
                .provider
                .copy_to_resource(id, &data.data[..upload_stride * rows], size);
        }

        convert::repack_rows(
            &data.data,
            data.stride,
            rows,
            row_bytes,
            conversion,
            upload_stride,
            &mut self.upload_pixels,
        );
        self.provider
            .copy_to_resource(id, &self.upload_pixels[..upload_stride * rows], size)
    }

    fn recycle_resource(&mut self, id: ResourceId, sync_token: SyncToken, lost: bool) {
        let Some(index) = self.all_resources.iter().position(|r| r.resource_id == id) else {
            log::debug!("Release for unknown {:?}", id);
            return;
        };

        if let Some(context) = self.context.as_mut()
            && sync_token.has_data()
        {
            context.wait_sync_token(&sync_token);
        }

        if lost {
            let mut resource = self.all_resources.swap_remove(index);
            resource.clear_refs();
            log::debug!("Deleting lost {:?}", id);
            self.provider.delete_resource(resource.resource_id);
            return;
        }

        self.all_resources[index].remove_ref();
    }

    fn return_texture(&mut self, frame: &VideoFrame, sync_token: SyncToken, lost: bool) {
        if lost {
            return;
        }
        let Some(context) = self.context.as_mut() else {
            if sync_token.has_data() {
                frame.update_release_sync_token(sync_token);
            }
            return;
        };

        let previous = frame.release_sync_token();
        if previous.has_data() {
            context.wait_sync_token(&previous);
        }
        let next = if sync_token.has_data() {
            sync_token
        } else {
            context.insert_fence_sync()
        };
        frame.update_release_sync_token(next);
    }
}

impl<P: ResourceProvider, G: GpuContext> Drop for VideoResourceUpdater<P, G> {
    fn drop(&mut self) {
        let checked_out = self.checked_out();
        if checked_out > 0 {
            log::warn!(
                "Video resource updater dropped with {} resource{} still checked out",
                checked_out,
                if checked_out == 1 { "" } else { "s" }
            );
        }
        for resource in self.all_resources.drain(..) {
            self.provider.delete_resource(resource.resource_id);
        }
    }
}
