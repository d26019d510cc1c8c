//! Integration tests for cloudmirror-transfer
//!
//! Drives the TransferEngine end to end against the in-memory backend,
//! with real local trees in temporary directories.


mod test_chunked;
mod test_delete;
mod test_download;
mod test_upload;
