//! In-memory mock implementations of the client traits, used by the test
//! suites across the crate.

mod mock_download_client;
mod mock_indexer;
mod mock_metadata;
mod mock_notifier;

pub use mock_download_client::{MockDownloadClient, RecordedAdd};
pub use mock_indexer::{MockIndexer, RecordedSearch};
pub use mock_metadata::MockMetadataClient;
pub use mock_notifier::MockNotifier;
