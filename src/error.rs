//! Error taxonomy for the uploader.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("Unable to get public address: {0}")]
    AddressLookup(String),

    #[error("Unable to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to open image file {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid image file: {0}")]
    InvalidImageFile(String),

    #[error("Unable to create custom image: {0}")]
    ProviderRequest(String),

    #[error("Unable to get image info: {0}")]
    ProviderPoll(String),

    #[error("Image {id} failed to import: {message}")]
    ImportFailed { id: u64, message: String },

    #[error("HTTP server stopped: {0}")]
    Server(String),
}
