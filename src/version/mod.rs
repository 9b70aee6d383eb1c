//! Version numbers and half-open version bounds.
//!
//! - `number` - [`VersionNumber`], parsing and the infinite sentinel
//! - `bounds` - [`VersionBounds`], intersection and constraint expressions

mod bounds;
mod number;

pub use bounds::VersionBounds;
pub use number::VersionNumber;
