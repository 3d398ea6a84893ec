use std::{
    borrow::Cow,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use strum::Display;

use crate::{OverlayError, Result};

/// Resources compiled into the crate.
#[derive(Clone, Copy, Debug, Display, PartialEq)]
pub enum BundledResource {
    #[strum(serialize = "overlay.html")]
    OverlayTemplate,
    #[strum(serialize = "styles.css")]
    Stylesheet,
}

impl BundledResource {
    pub fn contents(&self) -> &'static str {
        match self {
            BundledResource::OverlayTemplate => include_str!("../resources/overlay.html"),
            BundledResource::Stylesheet => include_str!("../resources/styles.css"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResourceRef {
    File(PathBuf),
    Bundled(BundledResource),
}

impl ResourceRef {
    /// Current contents of the resource. Files are read on every call so
    /// edits show up on the next render.
    pub fn read(&self) -> Result<Cow<'static, str>> {
        match self {
            ResourceRef::File(path) => fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| OverlayError::ResourceMissing {
                    path: path.clone(),
                    source,
                }),
            ResourceRef::Bundled(resource) => Ok(Cow::Borrowed(resource.contents())),
        }
    }

    /// Name the template engine sees, used in error messages and to pick
    /// the escaping mode.
    pub fn name(&self) -> String {
        match self {
            ResourceRef::File(path) => path.display().to_string(),
            ResourceRef::Bundled(resource) => resource.to_string(),
        }
    }
}

/// Picks the override when one is given, otherwise the bundled default.
/// An override must name a readable file.
pub fn resolve(override_path: Option<&Path>, default: BundledResource) -> Result<ResourceRef> {
    let path = match override_path {
        Some(path) => path,
        None => return Ok(ResourceRef::Bundled(default)),
    };

    let not_found = |source: io::Error| OverlayError::ResourceNotFound {
        path: path.to_path_buf(),
        source,
    };
    let metadata = fs::metadata(path).map_err(not_found)?;
    if !metadata.is_file() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    File::open(path).map_err(not_found)?;

    Ok(ResourceRef::File(path.to_path_buf()))
}
