//! Dataset provisioning: decide where the index dataset lives, fetch and
//! unpack remote archives into scoped temporary storage, and read the label
//! table and optional metadata that ship next to the index.

pub mod archive;
mod error;
pub mod labels;
pub mod metadata;
pub mod remote;
pub mod source;

pub use archive::{ExtractStats, extract_tar, extract_tar_gz};
pub use error::{ArchiveError, DatasetError, FetchError};
pub use labels::{LABEL_FILE, LabelTable, load_label_table};
pub use metadata::{DatasetMeta, METADATA_FILE, load_metadata};
pub use remote::{ArchiveFetcher, GcsFetcher};
pub use source::{DatasetHandle, DatasetSource};
