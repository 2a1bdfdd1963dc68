//! Immutable template definitions produced by the parser.

use crate::Tendril;

/// Tab stop of a chunk that is never selected by navigation.
pub const LITERAL: i32 = -1;
/// Tab stop of the final caret position.
pub const FINAL_STOP: i32 = 0;

/// One fragment of a template: its unexpanded spec and tab stop.
///
/// `tab_stop` is [`LITERAL`], [`FINAL_STOP`] or a positive stop number.
/// Chunks sharing a positive stop number form a linked group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
  pub spec:     Tendril,
  pub tab_stop: i32,
}

impl ChunkSpec {
  pub fn literal(spec: impl Into<Tendril>) -> Self {
    Self {
      spec:     spec.into(),
      tab_stop: LITERAL,
    }
  }

  pub fn stop(tab_stop: i32, spec: impl Into<Tendril>) -> Self {
    debug_assert!(tab_stop >= FINAL_STOP, "negative stop number {tab_stop}");
    Self {
      spec: spec.into(),
      tab_stop,
    }
  }

  pub fn is_stop(&self) -> bool {
    self.tab_stop >= FINAL_STOP
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
  pub trigger:     Tendril,
  pub language:    Tendril,
  pub description: Option<Tendril>,
  pub chunks:      Vec<ChunkSpec>,
}

impl Template {
  pub fn new(trigger: impl Into<Tendril>, language: impl Into<Tendril>) -> Self {
    Self {
      trigger: trigger.into(),
      language: language.into(),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_chunks(mut self, chunks: Vec<ChunkSpec>) -> Self {
    self.chunks = chunks;
    self
  }

  /// Distinct positive stop numbers in navigation order.
  pub fn tab_stops(&self) -> Vec<i32> {
    let mut stops: Vec<i32> = self
      .chunks
      .iter()
      .map(|chunk| chunk.tab_stop)
      .filter(|&tab_stop| tab_stop > FINAL_STOP)
      .collect();
    stops.sort_unstable();
    stops.dedup();
    stops
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn tab_stop_queries() {
    let template = Template::new("for", "rust").with_chunks(vec![
      ChunkSpec::literal("for "),
      ChunkSpec::stop(2, "x"),
      ChunkSpec::stop(0, ""),
    ]);
    assert_eq!(template.tab_stops(), [2]);
    assert!(template.chunks[2].is_stop());
    assert!(!template.chunks[0].is_stop());

    let plain = Template::new("hr", "").with_chunks(vec![ChunkSpec::literal("---")]);
    assert!(plain.tab_stops().is_empty());

    let sparse = Template::new("s", "").with_chunks(vec![
      ChunkSpec::stop(2_000_000_000, ""),
      ChunkSpec::stop(3, "a"),
      ChunkSpec::literal(" "),
      ChunkSpec::stop(2_000_000_000, "b"),
    ]);
    assert_eq!(sparse.tab_stops(), [3, 2_000_000_000]);
  }
}
