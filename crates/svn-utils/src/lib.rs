//! Foundation utilities for the rsvn client.
//!
//! Byte-string relative paths and URLs, revision numbers and revision
//! specifiers, node kinds, tristate logic for versioned metadata bits,
//! property classification, and cancellation polling.

pub mod cancel;
pub mod error;
pub mod path;
pub mod props;
pub mod revision;
pub mod tristate;

// Re-export core types at crate root for convenience
pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use cancel::Canceller;
pub use error::UtilError;
pub use path::{is_url, RelPath};
pub use revision::{NodeKind, RevisionSpec, Revnum};
pub use tristate::Tristate;

pub type Result<T> = std::result::Result<T, UtilError>;
