//! Types shared between fclite crates.

pub mod errors;

pub use errors::{FcliteError, FcliteResult};
