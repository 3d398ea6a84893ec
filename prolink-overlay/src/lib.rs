use std::{io, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

pub mod format;
pub mod message;
pub mod players;
pub mod render;
pub mod resource;
pub mod routes;
pub mod server;
pub mod upstream;

pub use message::{ColorItem, DeviceAnnouncement, SearchableItem, TrackMetadata};
pub use players::{build_players_view, DeviceRecord, PlayersAggregator, PlayersView, TrackRecord};
pub use resource::{BundledResource, ResourceRef};
pub use server::{start, stop, ServerConfig, ServerHandle, ServerOptions};
pub use upstream::{DeviceRegistry, MetadataCache, SnapshotSource};

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("unable to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// An override path was unusable when the server was started.
    #[error("resource not found: {}: {source}", path.display())]
    ResourceNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A resolved override went away while the server was running.
    #[error("missing resource {}: {source}", path.display())]
    ResourceMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timeout after {0:?}")]
    UpstreamTimeout(Duration),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl OverlayError {
    /// Errors that are confined to a single request and answered with a 500.
    pub fn is_render_error(&self) -> bool {
        matches!(
            self,
            OverlayError::Template(_)
                | OverlayError::ResourceMissing { .. }
                | OverlayError::UpstreamTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;
