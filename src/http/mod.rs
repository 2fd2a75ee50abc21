//! HTTP package source with a multi-process safe disk cache

pub mod cache;
pub mod integrity;
pub mod source;
pub mod transport;

pub use cache::{base_uri_folder, sanitize_file_name, CACHE_FILE_SUFFIX};
pub use integrity::IntegrityValidator;
pub use source::{
    ContentValidator, Credentials, GetOptions, HttpSource, HttpSourceOptions, HttpSourceResult,
};
pub use transport::{HttpRequest, HttpTransport, UreqTransport};
