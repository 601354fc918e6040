//! Compiling authored modules into a single bundle.

mod bundle;
mod resolver;
mod runtime;

pub use bundle::*;
pub use resolver::*;
pub use runtime::*;
