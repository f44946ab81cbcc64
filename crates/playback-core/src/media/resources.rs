//! Pooled plane resources and the resources handed to the compositor.

use std::sync::Arc;

use crossbeam_channel::Sender;

use super::frame::VideoFrame;
use super::types::{Mailbox, ResourceFormat, ResourceId, Size, SyncToken, TextureTarget};

/// Which decoded-frame plane a resource currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentTag {
    pub frame_id: u64,
    pub plane_index: usize,
}

/// A pooled resource. Checked out while `ref_count > 0`.
#[derive(Debug)]
pub struct PlaneResource {
    pub resource_id: ResourceId,
    pub size: Size,
    pub format: ResourceFormat,
    /// Zero when the resource has never been exported by mailbox.
    pub mailbox: Mailbox,
    ref_count: u32,
    tag: Option<ContentTag>,
}

impl PlaneResource {
    pub fn new(resource_id: ResourceId, size: Size, format: ResourceFormat, mailbox: Mailbox) -> Self {
        Self {
            resource_id,
            size,
            format,
            mailbox,
            ref_count: 0,
            tag: None,
        }
    }

    pub fn add_ref(&mut self) {
        self.ref_count += 1;
    }

    pub fn remove_ref(&mut self) {
        debug_assert!(self.ref_count > 0, "unbalanced release of {:?}", self.resource_id);
        self.ref_count = self.ref_count.saturating_sub(1);
    }

    pub fn clear_refs(&mut self) {
        self.ref_count = 0;
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn is_referenced(&self) -> bool {
        self.ref_count > 0
    }

    pub fn matches_tag(&self, frame_id: u64, plane_index: usize) -> bool {
        self.tag == Some(ContentTag {
            frame_id,
            plane_index,
        })
    }

    pub fn set_tag(&mut self, frame_id: u64, plane_index: usize) {
        self.tag = Some(ContentTag {
            frame_id,
            plane_index,
        });
    }

    pub fn clear_tag(&mut self) {
        self.tag = None;
    }

    pub fn tag(&self) -> Option<ContentTag> {
        self.tag
    }
}

/// Presentation kind of an [`ExternalResources`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalResourceType {
    #[default]
    None,
    Hole,
    SoftwareResource,
    YuvResource,
    RgbResource,
    RgbaPremultipliedResource,
    StreamTextureResource,
}

/// One resource handed to the compositor.
#[derive(Debug, Clone)]
pub struct ExternalResource {
    /// Set when the resource is backed by the updater's pool.
    pub resource_id: Option<ResourceId>,
    pub mailbox: Mailbox,
    pub sync_token: SyncToken,
    pub target: TextureTarget,
    pub size: Size,
    pub allow_overlay: bool,
}

/// Result of converting one frame.
#[derive(Debug)]
pub struct ExternalResources {
    pub kind: ExternalResourceType,
    pub resources: Vec<ExternalResource>,
    /// Parallel to `resources`.
    pub release_callbacks: Vec<ReleaseCallback>,
    /// Sample = (value - offset) * multiplier; identity unless half-float.
    pub offset: f32,
    pub multiplier: f32,
    pub read_lock_fences_enabled: bool,
}

impl ExternalResources {
    pub fn empty(kind: ExternalResourceType) -> Self {
        Self {
            kind,
            resources: Vec::new(),
            release_callbacks: Vec::new(),
            offset: 0.0,
            multiplier: 1.0,
            read_lock_fences_enabled: false,
        }
    }

    pub fn none() -> Self {
        Self::empty(ExternalResourceType::None)
    }

    pub fn is_none(&self) -> bool {
        self.kind == ExternalResourceType::None
    }

    /// Fire every release callback with the same token.
    pub fn release_all(self, sync_token: SyncToken, lost: bool) {
        for callback in self.release_callbacks {
            callback.run(sync_token, lost);
        }
    }
}

/// What a release hands back to the updater.
#[derive(Debug)]
pub enum ReleaseTarget {
    /// Return a pooled resource.
    Recycle(ResourceId),
    /// Return a wrapped decoder texture to its frame.
    ReturnTexture(Arc<VideoFrame>),
}

#[derive(Debug)]
pub struct ReleaseMessage {
    pub target: ReleaseTarget,
    pub sync_token: SyncToken,
    pub lost: bool,
}

/// Handle the consumer fires once it is done with a resource. `Send`, so it
/// may run on any thread; the message is applied on the updater's next
/// drain. Firing after the updater is gone does nothing.
#[must_use = "dropping a release callback leaks the resource until the updater is dropped"]
#[derive(Debug)]
pub struct ReleaseCallback {
    inbox: Sender<ReleaseMessage>,
    target: ReleaseTarget,
}

impl ReleaseCallback {
    pub(crate) fn new(inbox: Sender<ReleaseMessage>, target: ReleaseTarget) -> Self {
        Self { inbox, target }
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        match &self.target {
            ReleaseTarget::Recycle(id) => Some(*id),
            ReleaseTarget::ReturnTexture(_) => None,
        }
    }

    pub fn run(self, sync_token: SyncToken, lost: bool) {
        let message = ReleaseMessage {
            target: self.target,
            sync_token,
            lost,
        };
        if self.inbox.send(message).is_err() {
            log::debug!("Release after updater teardown; ignoring");
        }
    }
}
