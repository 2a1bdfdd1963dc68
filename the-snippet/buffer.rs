//! Host buffer interface used by live expansions, and a rope-backed
//! implementation of it.
//!
//! All offsets are character indices.

use std::{
  fmt,
  ops::Range,
};

use ropey::Rope;
use slotmap::SlotMap;

use crate::context;

slotmap::new_key_type! {
  pub struct AnchorId;
}

/// Which side of an anchor owns text inserted exactly at its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
  /// The anchor stays put; inserted text lands after it.
  Left,
  /// The anchor moves past inserted text.
  Right,
}

/// Mutable text with edit-surviving anchors and a selection.
///
/// Mutations through this trait are raw: edit notifications are dispatched
/// by [`crate::session::SnippetSession`], which wraps every user edit.
pub trait TextBuffer {
  fn len_chars(&self) -> usize;

  fn slice(&self, range: Range<usize>) -> String;

  fn insert(&mut self, offset: usize, text: &str);

  fn delete(&mut self, range: Range<usize>);

  fn create_anchor(&mut self, offset: usize, gravity: Gravity) -> AnchorId;

  /// `None` once the anchor has been released.
  fn anchor_offset(&self, anchor: AnchorId) -> Option<usize>;

  fn release_anchor(&mut self, anchor: AnchorId) -> bool;

  fn selection(&self) -> Range<usize>;

  fn set_selection(&mut self, range: Range<usize>);

  /// Indentation prefix for text inserted at `offset`.
  fn line_prefix(&self, offset: usize) -> String {
    let before = self.slice(0..offset);
    let line = before.rsplit('\n').next().unwrap_or_default();
    context::line_prefix(line)
  }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
  offset:  usize,
  gravity: Gravity,
}

#[derive(Debug, Clone, Default)]
pub struct RopeBuffer {
  text:      Rope,
  anchors:   SlotMap<AnchorId, Anchor>,
  selection: Range<usize>,
}

impl RopeBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn text(&self) -> &Rope {
    &self.text
  }

  pub fn anchor_count(&self) -> usize {
    self.anchors.len()
  }

  fn clamp(&self, range: Range<usize>) -> Range<usize> {
    let len = self.text.len_chars();
    let end = range.end.min(len);
    range.start.min(end)..end
  }
}

impl From<&str> for RopeBuffer {
  fn from(text: &str) -> Self {
    Self {
      text: Rope::from_str(text),
      ..Self::default()
    }
  }
}

impl fmt::Display for RopeBuffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for chunk in self.text.chunks() {
      f.write_str(chunk)?;
    }
    Ok(())
  }
}

impl TextBuffer for RopeBuffer {
  fn len_chars(&self) -> usize {
    self.text.len_chars()
  }

  fn slice(&self, range: Range<usize>) -> String {
    let range = self.clamp(range);
    self.text.slice(range).to_string()
  }

  fn insert(&mut self, offset: usize, text: &str) {
    let offset = offset.min(self.text.len_chars());
    let len = text.chars().count();
    if len == 0 {
      return;
    }
    self.text.insert(offset, text);

    for anchor in self.anchors.values_mut() {
      if anchor.offset > offset || (anchor.offset == offset && anchor.gravity == Gravity::Right) {
        anchor.offset += len;
      }
    }
    let shift = |pos: usize| if pos > offset { pos + len } else { pos };
    self.selection = shift(self.selection.start)..shift(self.selection.end);
  }

  fn delete(&mut self, range: Range<usize>) {
    let range = self.clamp(range);
    if range.is_empty() {
      return;
    }
    self.text.remove(range.clone());

    let shift = |pos: usize| {
      if pos >= range.end {
        pos - range.len()
      } else {
        pos.min(range.start)
      }
    };
    for anchor in self.anchors.values_mut() {
      anchor.offset = shift(anchor.offset);
    }
    self.selection = shift(self.selection.start)..shift(self.selection.end);
  }

  fn create_anchor(&mut self, offset: usize, gravity: Gravity) -> AnchorId {
    let offset = offset.min(self.text.len_chars());
    self.anchors.insert(Anchor { offset, gravity })
  }

  fn anchor_offset(&self, anchor: AnchorId) -> Option<usize> {
    self.anchors.get(anchor).map(|anchor| anchor.offset)
  }

  fn release_anchor(&mut self, anchor: AnchorId) -> bool {
    self.anchors.remove(anchor).is_some()
  }

  fn selection(&self) -> Range<usize> {
    self.selection.clone()
  }

  fn set_selection(&mut self, range: Range<usize>) {
    self.selection = self.clamp(range);
  }

  fn line_prefix(&self, offset: usize) -> String {
    let offset = offset.min(self.text.len_chars());
    let line_start = self.text.line_to_char(self.text.char_to_line(offset));
    context::line_prefix(&self.slice(line_start..offset))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn anchors_follow_gravity() {
    let mut buffer = RopeBuffer::from("abcd");
    let left = buffer.create_anchor(2, Gravity::Left);
    let right = buffer.create_anchor(2, Gravity::Right);

    buffer.insert(2, "XY");
    assert_eq!(buffer.to_string(), "abXYcd");
    assert_eq!(buffer.anchor_offset(left), Some(2));
    assert_eq!(buffer.anchor_offset(right), Some(4));

    buffer.insert(0, "_");
    assert_eq!(buffer.anchor_offset(left), Some(3));
    assert_eq!(buffer.anchor_offset(right), Some(5));
  }

  #[test]
  fn deletes_clamp_anchors_into_the_hole() {
    let mut buffer = RopeBuffer::from("0123456789");
    let inside = buffer.create_anchor(5, Gravity::Left);
    let after = buffer.create_anchor(8, Gravity::Right);
    buffer.set_selection(9..9);

    buffer.delete(3..7);
    assert_eq!(buffer.to_string(), "012789");
    assert_eq!(buffer.anchor_offset(inside), Some(3));
    assert_eq!(buffer.anchor_offset(after), Some(4));
    assert_eq!(buffer.selection(), 5..5);

    buffer.delete(4..4);
    buffer.delete(4..100);
    assert_eq!(buffer.to_string(), "0127");
  }

  #[test]
  fn released_anchors_are_gone() {
    let mut buffer = RopeBuffer::from("x");
    let anchor = buffer.create_anchor(1, Gravity::Left);
    assert!(buffer.release_anchor(anchor));
    assert!(!buffer.release_anchor(anchor));
    assert_eq!(buffer.anchor_offset(anchor), None);
    assert_eq!(buffer.anchor_count(), 0);
  }

  #[test]
  fn line_prefix_mirrors_indentation() {
    let buffer = RopeBuffer::from("fn main() {\n\t  let x = ");
    let end = buffer.len_chars();
    assert_eq!(buffer.line_prefix(end), "\t          ");
    assert_eq!(buffer.line_prefix(3), "   ");
  }
}
