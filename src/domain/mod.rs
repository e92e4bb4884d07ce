pub mod format;
pub mod reader;
pub mod storage;

pub use format::DomainFileFormat;
pub use reader::{DomainReadError, OutputDomainReader};
pub use storage::{
    BlobStorageClient, BlobStorageError, DataLocation, LocalBlobStorageClient,
};
