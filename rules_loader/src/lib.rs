//! # Rules Loader
//!
//! Loads authored rules systems out of a content vault.
//!
//! An author keeps a small graph of Rhai modules next to their notes. The
//! entry module binds its configuration to a top-level `system` variable,
//! usually through the `rules` builder package:
//!
//! ```rhai
//! import "rules" as rules;
//! import "./lib/stats" as stats;
//!
//! let system = rules::system(#{
//!     name: "Fifth Edition",
//!     attributes: stats::attributes,
//!     entities: #{
//!         character: #{
//!             frontmatter: #{ level: #{ "type": "number", "default": 1 } },
//!             blocks: #{ header: |ctx| rules::header(#{ title: ctx.name }) },
//!             expressions: #{ attack: |str, dex| str + dex },
//!         },
//!         monster: |ctx| #{ lookup: ctx.wiki.folder("Monsters") },
//!     },
//! });
//! ```
//!
//! [`RulesLoader::load_system`] compiles the module graph, evaluates it in a
//! sandbox, resolves factories and deferred values, and normalizes the result
//! into a [`game_rules::SystemDefinition`].

pub mod compiler;
pub mod config;
pub mod error;
pub mod factories;
pub mod frontmatter;
pub mod normalize;
pub mod pipeline;
pub mod sandbox;
pub mod source;

pub use compiler::{compile, Bundle, CompiledBundle, CompilerRuntime};
pub use config::{BackendProfile, LoaderConfig};
pub use error::*;
pub use factories::resolve_entity_factories;
pub use frontmatter::ParsedDocument;
pub use normalize::SystemNormalizer;
pub use pipeline::*;
pub use sandbox::{SandboxEvaluator, Wiki};
pub use source::{ContentDescriptor, ContentSource, FsSource, MemorySource};
