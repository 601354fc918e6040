//! # Game Rules
//!
//! The canonical, validated shape of an authored rules system. A
//! [`SystemDefinition`] is produced once by the loader and then handed to the
//! rendering layer, which treats it as read-only.
//!
//! This crate holds no scripting logic: callables coming from authored modules
//! are seen only through the [`Callable`] trait.

pub mod entities;
pub mod error;
pub mod mechanics;
pub mod system;

pub use entities::*;
pub use error::*;
pub use mechanics::*;
pub use system::*;
