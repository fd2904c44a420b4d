// Utility functions module
pub mod bytes;

// Re-export for easy access
pub use bytes::format_bytes;
