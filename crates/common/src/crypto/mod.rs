//! Symmetric cryptographic primitives.

pub mod encryption;

pub use encryption::{derive_export_key, EncryptedData, EncryptionService};
