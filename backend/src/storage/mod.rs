//! Local repository storage.

pub mod checksum;
pub mod content;
pub mod filesystem;
