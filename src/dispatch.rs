//! Dispatch surface built from the server manifest.
//!
//! ## Module Structure
//!
//! - `tree` - DispatchTree: dotted action names to descriptors
//! - `action` - ActionHandle (a resolved, callable leaf) and payload extraction

mod action;
mod tree;

pub use action::{ActionHandle, extract_payload};
pub use tree::{DispatchNode, DispatchTree};
