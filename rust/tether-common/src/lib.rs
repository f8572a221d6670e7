//! Common error and result plumbing shared by the `tether` crates.

pub mod error;
pub mod result;

pub use error::{Error, ErrorKind};
pub use result::Result;
