//! ffmpeg actions.
//!
//! Each action has a pure `*_args` function that builds the argument vector
//! and an async runner that executes it through [`ToolCommand`](crate::ToolCommand).

mod package;
mod slice;

pub use package::{package, package_args};
pub use slice::{slice, slice_args};
