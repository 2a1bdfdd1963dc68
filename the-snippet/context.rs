//! Variable store and renderer shared by the chunks of one expansion.
//!
//! Variables live in two tiers. Instance-local variables hold the value of
//! each stop group (`"1"`, `"2"`, ...) and per-buffer facts such as the file
//! name. Shared variables (author, date, ...) are copied into every new
//! context. Lookups consult the local tier first.

use std::{
  collections::HashMap,
  path::Path,
  sync::Arc,
};

use chrono::Local;
use thiserror::Error;

use crate::{
  Tendril,
  filter::FilterRegistry,
  syntax::{
    SyntaxError,
    TokenKind,
    Tokenizer,
  },
};

pub const DEFAULT_TAB_WIDTH: usize = 4;
pub const DEFAULT_RECURSION_LIMIT: usize = 32;
pub const DEFAULT_EMAIL: &str = "unknown@domain.org";

pub type Result<T> = std::result::Result<T, ExpansionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
  #[error("recursion limit")]
  RecursionLimit { limit: usize },
  #[error(transparent)]
  Syntax(#[from] SyntaxError),
}

#[derive(Debug, Clone)]
pub struct ExpansionContext {
  locals:          HashMap<Tendril, String>,
  shared:          HashMap<Tendril, String>,
  line_prefix:     String,
  tab_width:       usize,
  insert_spaces:   bool,
  recursion_limit: usize,
  filters:         Arc<FilterRegistry>,
  generation:      u64,
}

impl Default for ExpansionContext {
  fn default() -> Self {
    Self {
      locals:          HashMap::new(),
      shared:          HashMap::new(),
      line_prefix:     String::new(),
      tab_width:       DEFAULT_TAB_WIDTH,
      insert_spaces:   true,
      recursion_limit: DEFAULT_RECURSION_LIMIT,
      filters:         FilterRegistry::shared(),
      generation:      0,
    }
  }
}

impl ExpansionContext {
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_filters(mut self, filters: Arc<FilterRegistry>) -> Self {
    self.filters = filters;
    self
  }

  pub fn set_tab_width(&mut self, tab_width: usize) {
    self.tab_width = tab_width;
  }

  pub fn tab_width(&self) -> usize {
    self.tab_width
  }

  pub fn set_insert_spaces(&mut self, insert_spaces: bool) {
    self.insert_spaces = insert_spaces;
  }

  pub fn insert_spaces(&self) -> bool {
    self.insert_spaces
  }

  pub fn set_recursion_limit(&mut self, limit: usize) {
    self.recursion_limit = limit;
  }

  pub fn set_line_prefix(&mut self, prefix: impl Into<String>) {
    self.line_prefix = prefix.into();
  }

  pub fn line_prefix(&self) -> &str {
    &self.line_prefix
  }

  pub fn filters(&self) -> &FilterRegistry {
    &self.filters
  }

  pub fn set_local(&mut self, key: &str, value: impl Into<String>) {
    self.locals.insert(key.into(), value.into());
  }

  pub fn local(&self, key: &str) -> Option<&str> {
    self.locals.get(key).map(String::as_str)
  }

  /// Value of the stop group `index`.
  pub fn stop_value(&self, index: i32) -> Option<&str> {
    self.local(&index.to_string())
  }

  pub fn set_stop_value(&mut self, index: i32, value: impl Into<String>) {
    self.set_local(&index.to_string(), value);
  }

  pub fn set_shared(&mut self, key: &str, value: impl Into<String>) {
    self.shared.insert(key.into(), value.into());
  }

  pub fn extend_shared<K, V>(&mut self, vars: impl IntoIterator<Item = (K, V)>)
  where
    K: Into<Tendril>,
    V: Into<String>,
  {
    self
      .shared
      .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .locals
      .get(name)
      .or_else(|| self.shared.get(name))
      .map(String::as_str)
  }

  /// Marks the values as changed. Expansions bound to this context re-render
  /// their chunks on their next propagation only after a notification.
  pub fn notify_changed(&mut self) {
    self.generation = self.generation.wrapping_add(1);
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Renders `spec`, resolving placeholders against this context.
  pub fn render(&self, spec: &str) -> Result<String> {
    let mut out = String::with_capacity(spec.len());
    self.render_into(spec, &mut out, 0)?;
    Ok(out)
  }

  fn render_into(&self, spec: &str, out: &mut String, depth: usize) -> Result<()> {
    if depth > self.recursion_limit {
      return Err(ExpansionError::RecursionLimit {
        limit: self.recursion_limit,
      });
    }

    for token in Tokenizer::new(spec) {
      let token = token?;
      match token.kind {
        TokenKind::Text => self.push_text(token.source, out),
        TokenKind::Escape(c) => out.push(c),
        TokenKind::Stop {
          index,
          default,
          filters,
        } => {
          let value = match (self.local(&index.to_string()), default) {
            (Some(value), _) => value.to_string(),
            (None, Some(default)) => {
              let mut value = String::new();
              self.render_into(default, &mut value, depth + 1)?;
              value
            },
            (None, None) => String::new(),
          };
          out.push_str(&self.apply_filters(filters, value));
        },
        TokenKind::Variable { name, filters } => {
          match self.get(name) {
            Some(value) => out.push_str(&self.apply_filters(filters, value.to_string())),
            None => out.push_str(token.source),
          }
        },
        TokenKind::Nested(inner) => self.render_into(inner, out, depth + 1)?,
      }
    }
    Ok(())
  }

  fn apply_filters(&self, filters: Option<&str>, value: String) -> String {
    match filters {
      Some(chain) => self.filters.apply_chain(chain, value),
      None => value,
    }
  }

  fn push_text(&self, text: &str, out: &mut String) {
    for c in text.chars() {
      match c {
        '\t' if self.insert_spaces => {
          out.extend(std::iter::repeat_n(' ', self.tab_width));
        },
        '\n' => {
          out.push('\n');
          out.push_str(&self.line_prefix);
        },
        c => out.push(c),
      }
    }
  }
}

/// Builds the indentation prefix for continuation lines from the text
/// between the start of the caret's line and the caret.
pub fn line_prefix(line_start_to_caret: &str) -> String {
  line_start_to_caret
    .chars()
    .map(|c| if matches!(c, '\t' | ' ') { c } else { ' ' })
    .collect()
}

/// Shared variables available to every expansion.
pub fn default_shared_variables() -> HashMap<Tendril, String> {
  let now = Local::now();
  let username = std::env::var("USER")
    .or_else(|_| std::env::var("USERNAME"))
    .unwrap_or_default();
  let fullname = std::env::var("NAME")
    .ok()
    .filter(|name| !name.is_empty())
    .unwrap_or_else(|| username.clone());

  [
    ("username", username),
    ("author", fullname.clone()),
    ("fullname", fullname),
    ("email", DEFAULT_EMAIL.to_string()),
    ("year", now.format("%Y").to_string()),
    ("shortmonth", now.format("%b").to_string()),
    ("day", now.format("%d").to_string()),
    ("shortweekday", now.format("%a").to_string()),
  ]
  .into_iter()
  .map(|(key, value)| (Tendril::from(key), value))
  .collect()
}

/// Instance-local variables describing the file being edited.
pub fn file_variables(path: &Path, workdir: Option<&Path>) -> Vec<(&'static str, String)> {
  let mut vars = Vec::with_capacity(5);
  if let Some(name) = path.file_name() {
    vars.push(("filename", name.to_string_lossy().into_owned()));
  }
  if let Some(parent) = path.parent() {
    vars.push(("dirname", parent.to_string_lossy().into_owned()));
  }
  vars.push(("path", path.to_string_lossy().into_owned()));

  if let Some(relative) = workdir.and_then(|dir| path.strip_prefix(dir).ok()) {
    vars.push(("relative_path", relative.to_string_lossy().into_owned()));
    if let Some(parent) = relative.parent() {
      vars.push(("relative_dirname", parent.to_string_lossy().into_owned()));
    }
  }
  vars
}
