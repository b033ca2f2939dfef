//! Vidtap engine: effect execution against the browser host, outcome
//! delivery and the download pipeline.
mod coordinator;
mod dispatch;
mod download;
mod filename;
mod host;
mod persist;

pub use coordinator::{Clock, Coordinator, CoordinatorConfig};
pub use dispatch::deliver;
pub use download::{
    ConsumerReply, ConsumerRequest, DownloadError, DownloadReport, DownloadRequest,
    DownloadSettings, MetaDocument, Quality, ResolvedSource, VideoDownloader,
};
pub use filename::{sanitize_filename, video_basename};
pub use host::{BrowserHost, HostError, HostEvent};
pub use persist::{ensure_output_dir, AtomicFileWriter, PendingFile, PersistError};
