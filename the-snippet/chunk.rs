use crate::{
  Tendril,
  context::ExpansionContext,
  template::{
    ChunkSpec,
    FINAL_STOP,
  },
};

/// Runtime fragment of a live expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
  spec:     Tendril,
  tab_stop: i32,
  text:     String,
  /// Set once a live edit overwrote the text; `spec` is no longer
  /// rendered after that.
  text_set: bool,
}

impl Chunk {
  pub fn from_spec(spec: &ChunkSpec) -> Self {
    Self {
      spec:     spec.spec.clone(),
      tab_stop: spec.tab_stop,
      text:     String::new(),
      text_set: false,
    }
  }

  pub fn spec(&self) -> &str {
    &self.spec
  }

  pub fn tab_stop(&self) -> i32 {
    self.tab_stop
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn text_set(&self) -> bool {
    self.text_set
  }

  pub fn is_stop(&self) -> bool {
    self.tab_stop >= FINAL_STOP
  }

  /// Stores text read back from the buffer after a live edit.
  pub fn set_text(&mut self, text: impl Into<String>) {
    self.text = text.into();
    self.text_set = true;
  }

  /// Marks a linked chunk as following its group value instead of its spec.
  pub fn mark_text_set(&mut self) {
    self.text_set = true;
  }

  /// The text this chunk should display for the current state of `ctx`.
  pub fn render(&self, ctx: &ExpansionContext) -> String {
    if self.tab_stop > FINAL_STOP
      && (self.text_set || self.spec.is_empty())
      && let Some(value) = ctx.stop_value(self.tab_stop)
    {
      return value.to_string();
    }
    if self.text_set || (self.tab_stop > FINAL_STOP && self.spec.is_empty()) {
      return self.text.clone();
    }
    match ctx.render(&self.spec) {
      Ok(text) => text,
      Err(err) => {
        tracing::warn!(spec = %self.spec, %err, "failed to render snippet chunk");
        String::new()
      },
    }
  }

  /// Re-renders the chunk, returning whether its text changed.
  pub fn refresh(&mut self, ctx: &ExpansionContext) -> bool {
    let text = self.render(ctx);
    if text == self.text {
      return false;
    }
    self.text = text;
    true
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn literal_chunks_render_their_spec_until_edited() {
    let mut ctx = ExpansionContext::new();
    ctx.set_shared("author", "Ada");
    let mut chunk = Chunk::from_spec(&ChunkSpec::literal("by $author"));
    assert!(chunk.refresh(&ctx));
    assert_eq!(chunk.text(), "by Ada");
    assert!(!chunk.refresh(&ctx));

    chunk.set_text("by me");
    ctx.set_shared("author", "Grace");
    assert!(!chunk.refresh(&ctx));
    assert_eq!(chunk.text(), "by me");
  }

  #[test]
  fn linked_stops_mirror_their_group() {
    let mut ctx = ExpansionContext::new();
    let mut primary = Chunk::from_spec(&ChunkSpec::stop(1, "foo"));
    let mut mirror = Chunk::from_spec(&ChunkSpec::stop(1, ""));
    primary.refresh(&ctx);
    mirror.refresh(&ctx);
    assert_eq!((primary.text(), mirror.text()), ("foo", ""));

    ctx.set_stop_value(1, "bar");
    mirror.refresh(&ctx);
    assert_eq!(mirror.text(), "bar");
    // Unedited stops with a default keep showing it.
    primary.refresh(&ctx);
    assert_eq!(primary.text(), "foo");
    primary.mark_text_set();
    primary.refresh(&ctx);
    assert_eq!(primary.text(), "bar");
  }

  #[test]
  fn render_failures_produce_empty_text() {
    let ctx = ExpansionContext::new();
    let mut chunk = Chunk::from_spec(&ChunkSpec::literal("a${1x}"));
    chunk.refresh(&ctx);
    assert_eq!(chunk.text(), "");

    let deep = format!("{}x{}", "${1:".repeat(64), "}".repeat(64));
    let mut chunk = Chunk::from_spec(&ChunkSpec::stop(2, deep));
    chunk.refresh(&ctx);
    assert_eq!(chunk.text(), "");
  }
}
