//! Stack of live expansions attached to one buffer.
//!
//! Every user edit goes through the session, which wraps the buffer mutation
//! with the edit hooks of the topmost expansion. Lower expansions are paused
//! until the ones above them are popped.

use std::{
  collections::HashMap,
  ops::Range,
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
};

use crate::{
  Tendril,
  buffer::TextBuffer,
  config::SnippetConfig,
  context::{
    self,
    ExpansionContext,
  },
  expansion::LiveExpansion,
  filter::FilterRegistry,
  parser::{
    self,
    ParseError,
  },
  template::Template,
};

#[derive(Debug)]
pub struct SnippetSession<B> {
  buffer:  B,
  stack:   Vec<LiveExpansion>,
  config:  SnippetConfig,
  filters: Arc<FilterRegistry>,
  shared:  HashMap<Tendril, String>,
  file:    Option<PathBuf>,
  workdir: Option<PathBuf>,
}

impl<B: TextBuffer> SnippetSession<B> {
  pub fn new(buffer: B) -> Self {
    Self::with_config(buffer, SnippetConfig::default())
  }

  pub fn with_config(buffer: B, config: SnippetConfig) -> Self {
    let mut shared = context::default_shared_variables();
    shared.extend(
      config
        .variables
        .iter()
        .map(|(key, value)| (Tendril::from(key.as_str()), value.clone())),
    );
    Self {
      buffer,
      stack: Vec::new(),
      config,
      filters: FilterRegistry::shared(),
      shared,
      file: None,
      workdir: None,
    }
  }

  #[must_use]
  pub fn with_filters(mut self, filters: Arc<FilterRegistry>) -> Self {
    self.filters = filters;
    self
  }

  /// Describes the file behind the buffer for the file variables.
  pub fn set_file(&mut self, path: impl Into<PathBuf>, workdir: Option<&Path>) {
    self.file = Some(path.into());
    self.workdir = workdir.map(Path::to_path_buf);
  }

  pub fn set_shared(&mut self, key: &str, value: impl Into<String>) {
    self.shared.insert(key.into(), value.into());
  }

  pub fn buffer(&self) -> &B {
    &self.buffer
  }

  /// Finishes every expansion and hands the buffer back.
  pub fn into_buffer(mut self) -> B {
    self.clear();
    self.buffer
  }

  pub fn depth(&self) -> usize {
    self.stack.len()
  }

  pub fn is_active(&self) -> bool {
    !self.stack.is_empty()
  }

  pub fn top(&self) -> Option<&LiveExpansion> {
    self.stack.last()
  }

  pub fn current_full_text(&self) -> Option<String> {
    self.top().map(|expansion| expansion.full_text(&self.buffer))
  }

  fn build_context(&self, offset: usize) -> ExpansionContext {
    let mut ctx = ExpansionContext::new().with_filters(Arc::clone(&self.filters));
    ctx.set_tab_width(self.config.tab_width);
    ctx.set_insert_spaces(self.config.insert_spaces);
    ctx.set_recursion_limit(self.config.recursion_limit);
    ctx.set_line_prefix(self.buffer.line_prefix(offset));
    ctx.extend_shared(self.shared.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(file) = &self.file {
      for (key, value) in context::file_variables(file, self.workdir.as_deref()) {
        ctx.set_local(key, value);
      }
    }
    ctx
  }

  /// Expands `template` at `offset`. Returns whether the expansion stays
  /// active, i.e. it has a stop to edit.
  pub fn push(&mut self, template: &Template, offset: usize) -> bool {
    let offset = offset.min(self.buffer.len_chars());
    self.pop_outside(offset..offset);
    if let Some(outer) = self.stack.last_mut() {
      outer.set_cursor(&self.buffer, offset);
    }

    let ctx = self.build_context(offset);
    let expansion = LiveExpansion::begin(template, ctx, &mut self.buffer, offset);
    let complete = expansion.is_complete();
    self.stack.push(expansion);
    tracing::debug!(trigger = %template.trigger, depth = self.stack.len(), "pushed snippet");

    if complete {
      self.pop();
      return false;
    }
    true
  }

  /// Expands `template` at the caret.
  pub fn push_at_caret(&mut self, template: &Template) -> bool {
    let offset = self.buffer.selection().start;
    self.push(template, offset)
  }

  /// Parses a bare body and expands it at the caret.
  pub fn push_str(&mut self, body: &str) -> Result<bool, ParseError> {
    let template = parser::parse_one(body)?;
    Ok(self.push_at_caret(&template))
  }

  /// Finishes the top expansion. A paused expansion below it takes the text
  /// of the popped one into its current chunk and advances to its next stop.
  pub fn pop(&mut self) -> Option<String> {
    self.pop_inner(true)
  }

  fn pop_inner(&mut self, advance: bool) -> Option<String> {
    let mut expansion = self.stack.pop()?;
    let text = expansion.full_text(&self.buffer);
    expansion.finish(&mut self.buffer);
    tracing::debug!(trigger = expansion.trigger(), depth = self.stack.len(), "popped snippet");

    if let Some(outer) = self.stack.last_mut() {
      outer.resync_current_chunk(&mut self.buffer);
      if advance && !outer.move_next(&mut self.buffer) {
        self.pop_inner(advance);
      }
    }
    Some(text)
  }

  /// Finishes expansions whose region does not contain `range`.
  fn pop_outside(&mut self, range: Range<usize>) {
    while let Some(top) = self.stack.last() {
      if top.contains(&self.buffer, range.clone()) {
        break;
      }
      self.pop_inner(false);
    }
  }

  /// Finishes every expansion without navigating.
  pub fn clear(&mut self) {
    while self.pop_inner(false).is_some() {}
  }

  /// Cancels the top expansion.
  pub fn cancel(&mut self) -> Option<String> {
    self.pop()
  }

  /// Moves to the next stop, popping the expansion once it is complete.
  pub fn move_next(&mut self) -> bool {
    let Some(top) = self.stack.last_mut() else {
      return false;
    };
    if top.move_next(&mut self.buffer) {
      return true;
    }
    self.pop();
    false
  }

  pub fn move_previous(&mut self) -> bool {
    match self.stack.last_mut() {
      Some(top) => top.move_previous(&mut self.buffer),
      None => false,
    }
  }

  /// Moves the caret, finishing expansions that no longer contain it.
  pub fn set_cursor(&mut self, offset: usize) {
    let offset = offset.min(self.buffer.len_chars());
    self.pop_outside(offset..offset);
    self.buffer.set_selection(offset..offset);
    if let Some(top) = self.stack.last_mut() {
      top.set_cursor(&self.buffer, offset);
    }
  }

  pub fn insert(&mut self, offset: usize, text: &str) {
    if text.is_empty() {
      return;
    }
    let offset = offset.min(self.buffer.len_chars());
    self.pop_outside(offset..offset);

    if let Some(top) = self.stack.last_mut() {
      top.before_insert(&self.buffer, offset, text);
    }
    self.buffer.insert(offset, text);
    let caret = offset + text.chars().count();
    self.buffer.set_selection(caret..caret);
    if let Some(top) = self.stack.last_mut() {
      top.after_insert(&mut self.buffer, offset, text);
    }
    self.check_top();
  }

  pub fn delete(&mut self, range: Range<usize>) {
    let len = self.buffer.len_chars();
    let range = range.start.min(len)..range.end.min(len);
    if range.is_empty() {
      return;
    }
    self.pop_outside(range.clone());

    if let Some(top) = self.stack.last_mut() {
      top.before_delete(&self.buffer, range.clone());
    }
    self.buffer.delete(range.clone());
    self.buffer.set_selection(range.start..range.start);
    if let Some(top) = self.stack.last_mut() {
      top.after_delete(&mut self.buffer, range);
    }
    self.check_top();
  }

  /// Replaces the selection with `text`, the way typing does.
  pub fn replace_selection(&mut self, text: &str) {
    let selection = self.buffer.selection();
    self.delete(selection.clone());
    self.insert(selection.start, text);
  }

  fn check_top(&mut self) {
    let Some(top) = self.stack.last() else {
      return;
    };
    if let Err(err) = top.check_invariant(&self.buffer) {
      tracing::error!(trigger = top.trigger(), %err, "snippet bookkeeping corrupted");
      debug_assert!(false, "snippet invariant violated: {err}");
      self.pop_inner(false);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    buffer::{
      AnchorId,
      Gravity,
      RopeBuffer,
    },
    parser::parse_one,
  };

  /// Reports the right-gravity anchor one character early once a second
  /// edit happened.
  #[derive(Debug, Default)]
  struct DriftingBuffer {
    inner: RopeBuffer,
    edits: usize,
    end:   Option<AnchorId>,
  }

  impl TextBuffer for DriftingBuffer {
    fn len_chars(&self) -> usize {
      self.inner.len_chars()
    }

    fn slice(&self, range: Range<usize>) -> String {
      self.inner.slice(range)
    }

    fn insert(&mut self, offset: usize, text: &str) {
      self.edits += 1;
      self.inner.insert(offset, text);
    }

    fn delete(&mut self, range: Range<usize>) {
      self.edits += 1;
      self.inner.delete(range);
    }

    fn create_anchor(&mut self, offset: usize, gravity: Gravity) -> AnchorId {
      let anchor = self.inner.create_anchor(offset, gravity);
      if gravity == Gravity::Right {
        self.end = Some(anchor);
      }
      anchor
    }

    fn anchor_offset(&self, anchor: AnchorId) -> Option<usize> {
      let offset = self.inner.anchor_offset(anchor)?;
      if self.end == Some(anchor) && self.edits > 1 {
        return Some(offset.saturating_sub(1));
      }
      Some(offset)
    }

    fn release_anchor(&mut self, anchor: AnchorId) -> bool {
      self.inner.release_anchor(anchor)
    }

    fn selection(&self) -> Range<usize> {
      self.inner.selection()
    }

    fn set_selection(&mut self, range: Range<usize>) {
      self.inner.set_selection(range);
    }
  }

  fn session(text: &str) -> SnippetSession<RopeBuffer> {
    SnippetSession::new(RopeBuffer::from(text))
  }

  #[test]
  fn typing_fills_stops_in_order() {
    let mut session = session("");
    let template = parse_one("fn ${1:name}(${2}) -> $1 {$0}").unwrap();
    assert!(session.push(&template, 0));
    assert_eq!(session.buffer().to_string(), "fn name() -> name {}");

    session.replace_selection("run");
    assert!(session.move_next());
    session.replace_selection("x");
    assert!(!session.move_next());
    assert!(!session.is_active());
    assert_eq!(session.buffer().to_string(), "fn run(x) -> run {}");
    assert_eq!(session.buffer().selection(), 18..18);
  }

  #[test]
  fn editing_outside_the_region_finishes_it() {
    let mut session = session("tail");
    let template = parse_one("<$1>").unwrap();
    assert!(session.push(&template, 0));
    session.insert(4, "!");
    assert!(!session.is_active());
    assert_eq!(session.buffer().to_string(), "<>ta!il");
    assert_eq!(session.buffer().anchor_count(), 0);
  }

  #[test]
  fn templates_without_stops_are_not_kept() {
    let mut session = session("");
    assert!(!session.push_str("just text").unwrap());
    assert_eq!(session.depth(), 0);
    assert!(session.push_str("${1:open").is_err());
  }

  #[test]
  fn line_prefix_indents_continuation_lines() {
    let mut session = session("  x = ");
    let template = parse_one("{\n\t$1\n}").unwrap();
    session.push(&template, 6);
    assert_eq!(session.buffer().to_string(), "  x = {\n          \n      }");
  }

  #[test]
  fn nested_expansion_hands_back_to_outer() {
    let mut session = session("");
    let outer = parse_one("call(${1:arg}, ${2:b})").unwrap();
    let inner = parse_one("[${1:i}]").unwrap();
    assert!(session.push(&outer, 0));
    session.replace_selection("");
    assert!(session.push_at_caret(&inner));
    assert_eq!(session.depth(), 2);
    assert_eq!(session.buffer().to_string(), "call([i], b)");

    session.replace_selection("7");
    // The inner expansion completes and the outer one moves on to `$2`.
    assert!(!session.move_next());
    assert_eq!(session.depth(), 1);
    assert_eq!(session.buffer().to_string(), "call([7], b)");
    let top = session.top().unwrap();
    assert_eq!(top.tab_stop(), 2);
    assert_eq!(top.chunks()[1].text(), "[7]");
    assert_eq!(session.buffer().selection(), 10..11);
  }

  #[test]
  fn file_and_config_variables_render() {
    let config = SnippetConfig {
      variables: [("author".to_string(), "Ada".to_string())].into_iter().collect(),
      ..SnippetConfig::default()
    };
    let mut session = SnippetSession::with_config(RopeBuffer::new(), config);
    session.set_file("/src/widget.c", None);
    session.push_str("$filename|stripsuffix by $author$0").unwrap();
    assert_eq!(session.buffer().to_string(), "widget by Ada");
  }

  #[test]
  fn cancel_keeps_text() {
    let mut session = session("");
    session.push_str("${1:a} ${2:b}").unwrap();
    assert_eq!(session.cancel().as_deref(), Some("a b"));
    assert!(!session.is_active());
    assert_eq!(session.into_buffer().to_string(), "a b");
  }

  #[test]
  #[cfg_attr(debug_assertions, should_panic(expected = "snippet invariant violated"))]
  fn corrupted_bookkeeping_finishes_the_expansion() {
    let mut session = SnippetSession::new(DriftingBuffer::default());
    let template = parse_one("(${1:x})").unwrap();
    assert!(session.push(&template, 0));
    assert_eq!(session.buffer().inner.to_string(), "(x)");

    session.insert(2, "y");
    assert!(!session.is_active());
    let buffer = session.into_buffer();
    assert_eq!(buffer.inner.to_string(), "(xy)");
    assert_eq!(buffer.inner.anchor_count(), 0);
  }
}
