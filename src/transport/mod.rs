/// Filesystem transport: shard discovery and buffered file handles.
pub mod fs;
