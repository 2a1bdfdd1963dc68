//! Live template (snippet) expansion for a text editor.
//!
//! Templates are compiled from the `.snippets` text format by [`parser`],
//! instantiated into a host buffer by [`expansion::LiveExpansion`] and kept in
//! sync with user edits through the hooks dispatched by
//! [`session::SnippetSession`].

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod expansion;
pub mod filter;
pub mod library;
pub mod parser;
pub mod session;
pub mod syntax;
pub mod template;

pub type Tendril = SmartString<LazyCompact>;
