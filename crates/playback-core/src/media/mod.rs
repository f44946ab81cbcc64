pub mod convert;
pub mod frame;
pub mod provider;
pub mod resources;
pub mod types;
pub mod updater;

pub use frame::{FrameMetadata, PixelFormat, PlaneData, VideoFrame};
pub use provider::{GpuContext, ResourceError, ResourceProvider};
pub use resources::{ExternalResource, ExternalResourceType, ExternalResources, ReleaseCallback};
pub use types::{Mailbox, MailboxHolder, ResourceFormat, ResourceId, Size, SyncToken, TextureTarget};
pub use updater::VideoResourceUpdater;
