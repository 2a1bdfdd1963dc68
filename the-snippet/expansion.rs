//! A template instantiated into a host buffer.
//!
//! The expansion owns its chunks and a parallel array of run lengths, one per
//! chunk, holding the number of characters the chunk currently occupies in
//! the buffer. Only the region boundaries are buffer anchors; every interior
//! boundary is derived from the run lengths. The run lengths always sum to the
//! width of the region between the two anchors.
//!
//! Edit hooks come in pairs around each buffer mutation. `before_*` fixes up
//! the run lengths so they already describe the buffer after the mutation;
//! `after_*` reads the edited chunk back, updates the stop group value and
//! rewrites every chunk whose rendering changed. Rewrites go straight to the
//! buffer and never pass through the hooks again.

use std::ops::Range;

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
  Tendril,
  buffer::{
    AnchorId,
    Gravity,
    TextBuffer,
  },
  chunk::Chunk,
  context::ExpansionContext,
  template::{
    FINAL_STOP,
    Template,
  },
};

/// Upper bound of render passes needed for group values to settle.
const SETTLE_PASSES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
  #[error("expansion anchors were released")]
  Released,
  #[error("{chunks} chunks tracked by {runs} run lengths")]
  CountMismatch { chunks: usize, runs: usize },
  #[error("run lengths sum to {sum} but the region spans {span} characters")]
  LengthMismatch { sum: usize, span: usize },
}

#[derive(Debug)]
pub struct LiveExpansion {
  trigger:        Tendril,
  chunks:         Vec<Chunk>,
  runs:           Vec<usize>,
  context:        ExpansionContext,
  begin:          Option<AnchorId>,
  end:            Option<AnchorId>,
  tab_stop:       i32,
  /// Distinct positive stop numbers in ascending order.
  stops:          SmallVec<[i32; 8]>,
  current:        Option<usize>,
  complete:       bool,
  pending_insert: Option<usize>,
  pending_delete: SmallVec<[(usize, String); 4]>,
  /// Context generation the chunks were last rendered against.
  rendered:       u64,
}

impl LiveExpansion {
  /// Inserts `template` at `offset` and selects its first stop.
  ///
  /// When the template has nothing to visit besides the final stop the
  /// caret is placed there and [`LiveExpansion::is_complete`] reports it.
  pub fn begin<B: TextBuffer + ?Sized>(
    template: &Template,
    context: ExpansionContext,
    buffer: &mut B,
    offset: usize,
  ) -> Self {
    let offset = offset.min(buffer.len_chars());
    let chunks: Vec<Chunk> = template.chunks.iter().map(Chunk::from_spec).collect();
    let mut expansion = Self {
      trigger: template.trigger.clone(),
      stops: SmallVec::from_vec(template.tab_stops()),
      chunks,
      runs: Vec::new(),
      context,
      begin: None,
      end: None,
      tab_stop: FINAL_STOP,
      current: None,
      complete: false,
      pending_insert: None,
      pending_delete: SmallVec::new(),
      rendered: 0,
    };

    expansion.update_context();
    expansion.rendered = expansion.context.generation();
    let text: String = expansion.chunks.iter().map(Chunk::text).collect();
    expansion.runs = expansion
      .chunks
      .iter()
      .map(|chunk| chunk.text().chars().count())
      .collect();

    buffer.insert(offset, &text);
    let len = text.chars().count();
    expansion.begin = Some(buffer.create_anchor(offset, Gravity::Left));
    expansion.end = Some(buffer.create_anchor(offset + len, Gravity::Right));
    tracing::debug!(
      trigger = %expansion.trigger,
      offset,
      len,
      chunks = expansion.chunks.len(),
      "began snippet expansion"
    );

    expansion.move_next(buffer);
    expansion
  }

  pub fn trigger(&self) -> &str {
    &self.trigger
  }

  pub fn chunks(&self) -> &[Chunk] {
    &self.chunks
  }

  pub fn runs(&self) -> &[usize] {
    &self.runs
  }

  pub fn context(&self) -> &ExpansionContext {
    &self.context
  }

  pub fn context_mut(&mut self) -> &mut ExpansionContext {
    &mut self.context
  }

  pub fn tab_stop(&self) -> i32 {
    self.tab_stop
  }

  /// Highest stop number, `0` when there is none.
  pub fn max_tab_stop(&self) -> i32 {
    self.stops.last().copied().unwrap_or(FINAL_STOP)
  }

  pub fn current_chunk(&self) -> Option<usize> {
    self.current
  }

  /// Whether the last forward navigation found no further stop.
  pub fn is_complete(&self) -> bool {
    self.complete
  }

  pub fn is_finished(&self) -> bool {
    self.begin.is_none()
  }

  /// Absolute range of the expansion in the buffer.
  pub fn region<B: TextBuffer + ?Sized>(&self, buffer: &B) -> Option<Range<usize>> {
    let begin = buffer.anchor_offset(self.begin?)?;
    let end = buffer.anchor_offset(self.end?)?;
    Some(begin..end.max(begin))
  }

  /// Whether `range` lies inside the region, edges included.
  pub fn contains<B: TextBuffer + ?Sized>(&self, buffer: &B, range: Range<usize>) -> bool {
    self
      .region(buffer)
      .is_some_and(|region| region.start <= range.start && range.end <= region.end)
  }

  /// Absolute buffer range of chunk `idx`.
  pub fn chunk_range<B: TextBuffer + ?Sized>(&self, buffer: &B, idx: usize) -> Option<Range<usize>> {
    let begin = self.region(buffer)?.start;
    let start = begin + self.runs.get(..idx)?.iter().sum::<usize>();
    Some(start..start + self.runs.get(idx)?)
  }

  /// Text of the whole region as it currently reads in the buffer.
  pub fn full_text<B: TextBuffer + ?Sized>(&self, buffer: &B) -> String {
    match self.region(buffer) {
      Some(region) => buffer.slice(region),
      None => self.chunks.iter().map(Chunk::text).collect(),
    }
  }

  /// Resolves an offset relative to the region start to a chunk index.
  ///
  /// An offset on the boundary of the current chunk belongs to it; otherwise
  /// the first chunk whose end reaches the offset wins.
  fn chunk_at(&self, offset: usize) -> Option<usize> {
    if self.chunks.is_empty() {
      return None;
    }
    if let Some(current) = self.current {
      let start: usize = self.runs[..current].iter().sum();
      if (start..=start + self.runs[current]).contains(&offset) {
        return Some(current);
      }
    }

    let mut total = 0;
    for (idx, run) in self.runs.iter().enumerate() {
      total += run;
      if total >= offset {
        return Some(idx);
      }
    }
    Some(self.runs.len() - 1)
  }

  fn relative<B: TextBuffer + ?Sized>(&self, buffer: &B, offset: usize) -> Option<usize> {
    let region = self.region(buffer)?;
    Some(offset.clamp(region.start, region.end) - region.start)
  }

  /// Re-renders every chunk until the stop group values stop changing.
  /// Returns whether any chunk text changed.
  fn update_context(&mut self) -> bool {
    let mut changed_any = false;
    for _ in 0..SETTLE_PASSES {
      let mut changed = false;
      for chunk in &mut self.chunks {
        changed |= chunk.refresh(&self.context);
      }
      changed |= self.sync_group_values();
      changed_any |= changed;
      if !changed {
        break;
      }
    }
    changed_any
  }

  /// Publishes the text of each untouched stop group as its group value.
  fn sync_group_values(&mut self) -> bool {
    let mut changed = false;
    for &tab_stop in &self.stops {
      let group = || self.chunks.iter().filter(|chunk| chunk.tab_stop() == tab_stop);
      if group().any(Chunk::text_set) {
        continue;
      }
      let Some(primary) = group()
        .find(|chunk| !chunk.spec().is_empty())
        .or_else(|| group().next())
      else {
        continue;
      };
      if self.context.stop_value(tab_stop) != Some(primary.text()) {
        let text = primary.text().to_string();
        self.context.set_stop_value(tab_stop, text);
        changed = true;
      }
    }
    changed
  }

  /// Marks the group of `idx` as edited and publishes its text.
  fn publish_edit(&mut self, idx: usize) {
    self.context.notify_changed();
    let tab_stop = self.chunks[idx].tab_stop();
    if tab_stop <= FINAL_STOP {
      return;
    }
    for chunk in self
      .chunks
      .iter_mut()
      .filter(|chunk| chunk.tab_stop() == tab_stop)
    {
      chunk.mark_text_set();
    }
    let text = self.chunks[idx].text().to_string();
    self.context.set_stop_value(tab_stop, text);
  }

  pub fn before_insert<B: TextBuffer + ?Sized>(&mut self, buffer: &B, offset: usize, text: &str) {
    let Some(idx) = self
      .relative(buffer, offset)
      .and_then(|offset| self.chunk_at(offset))
    else {
      return;
    };
    self.runs[idx] += text.chars().count();
    self.pending_insert = Some(idx);
    tracing::trace!(chunk = idx, offset, "snippet insert");
  }

  pub fn after_insert<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B, offset: usize, _text: &str) {
    let Some(idx) = self.pending_insert.take() else {
      return;
    };
    let Some(range) = self.chunk_range(buffer, idx) else {
      return;
    };
    let live = buffer.slice(range);
    self.chunks[idx].set_text(live);
    self.publish_edit(idx);
    self.current = Some(idx);
    tracing::trace!(chunk = idx, offset, text = self.chunks[idx].text(), "snippet chunk edited");
    self.propagate(buffer);
  }

  pub fn before_delete<B: TextBuffer + ?Sized>(&mut self, buffer: &B, range: Range<usize>) {
    let (Some(lo), Some(hi)) = (
      self.relative(buffer, range.start),
      self.relative(buffer, range.end),
    ) else {
      return;
    };
    let Some(begin) = self.region(buffer).map(|region| region.start) else {
      return;
    };

    let mut start = 0;
    for (idx, run) in self.runs.iter_mut().enumerate() {
      let end = start + *run;
      let overlap_start = lo.max(start);
      let overlap_end = hi.min(end);
      if overlap_start < overlap_end {
        let live = buffer.slice(begin + start..begin + end);
        let text: String = live
          .chars()
          .enumerate()
          .filter(|(pos, _)| !(overlap_start - start..overlap_end - start).contains(pos))
          .map(|(_, c)| c)
          .collect();
        *run -= overlap_end - overlap_start;
        self.pending_delete.push((idx, text));
      }
      start = end;
    }
    tracing::trace!(?range, chunks = self.pending_delete.len(), "snippet delete");
  }

  pub fn after_delete<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B, _range: Range<usize>) {
    let touched = std::mem::take(&mut self.pending_delete);
    if touched.is_empty() {
      return;
    }
    for (idx, text) in &touched {
      self.chunks[*idx].set_text(text.as_str());
    }
    // Within one group the leftmost edited chunk decides the value.
    let mut published: SmallVec<[i32; 4]> = SmallVec::new();
    for (idx, _) in &touched {
      let tab_stop = self.chunks[*idx].tab_stop();
      if !published.contains(&tab_stop) {
        published.push(tab_stop);
        self.publish_edit(*idx);
      }
    }
    self.propagate(buffer);
  }

  /// Re-renders every chunk when the context changed since the last render,
  /// then rewrites those whose text no longer matches the buffer. The
  /// selection is carried across the rewrites.
  pub fn propagate<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) {
    if self.rendered != self.context.generation() {
      self.update_context();
      self.rendered = self.context.generation();
    }

    let selection = buffer.selection();
    let caret_start = buffer.create_anchor(selection.start, Gravity::Left);
    let caret_end = buffer.create_anchor(selection.end, Gravity::Left);

    for idx in 0..self.chunks.len() {
      let Some(range) = self.chunk_range(buffer, idx) else {
        break;
      };
      if buffer.slice(range) != self.chunks[idx].text() {
        self.replace_chunk_text(buffer, idx);
      }
    }

    if let (Some(start), Some(end)) = (
      buffer.anchor_offset(caret_start),
      buffer.anchor_offset(caret_end),
    ) {
      buffer.set_selection(start..end.max(start));
    }
    buffer.release_anchor(caret_start);
    buffer.release_anchor(caret_end);
  }

  /// Replaces the live text of chunk `idx` with its rendered text. The new
  /// text is inserted before the old one is deleted.
  fn replace_chunk_text<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B, idx: usize) {
    let Some(range) = self.chunk_range(buffer, idx) else {
      return;
    };
    let text = self.chunks[idx].text();
    let len = text.chars().count();
    if len > 0 {
      buffer.insert(range.start, text);
    }
    buffer.delete(range.start + len..range.end + len);
    self.runs[idx] = len;
    tracing::trace!(chunk = idx, len, "rewrote snippet chunk");
  }

  /// Re-reads the current chunk after a nested expansion inserted into it.
  /// The chunk absorbs whatever the region grew or shrank by.
  pub fn resync_current_chunk<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) {
    let Some(span) = self.region(buffer).map(|region| region.len()) else {
      return;
    };
    let Some(idx) = self.current.or_else(|| self.chunks.len().checked_sub(1)) else {
      return;
    };
    let sum: usize = self.runs.iter().sum();
    if span >= sum {
      self.runs[idx] += span - sum;
    } else {
      self.runs[idx] = self.runs[idx].saturating_sub(sum - span);
    }
    let Some(range) = self.chunk_range(buffer, idx) else {
      return;
    };
    let live = buffer.slice(range);
    self.chunks[idx].set_text(live);
    self.publish_edit(idx);
    self.propagate(buffer);
  }

  fn select_chunk<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B, idx: usize) {
    if let Some(range) = self.chunk_range(buffer, idx) {
      buffer.set_selection(range);
    }
    self.current = Some(idx);
  }

  fn find_stop(&self, tab_stop: i32) -> Option<usize> {
    self
      .chunks
      .iter()
      .position(|chunk| chunk.tab_stop() == tab_stop)
  }

  /// Selects the next stop group. Returns `false` once navigation reached
  /// the final stop (or the region end when there is none).
  pub fn move_next<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) -> bool {
    let next = if self.complete {
      None
    } else {
      self.stops.iter().copied().find(|&stop| stop > self.tab_stop)
    };
    if let Some(tab_stop) = next
      && let Some(idx) = self.find_stop(tab_stop)
    {
      self.tab_stop = tab_stop;
      self.select_chunk(buffer, idx);
      tracing::debug!(trigger = %self.trigger, tab_stop, "snippet stop selected");
      return true;
    }
    self.tab_stop = FINAL_STOP;
    self.complete = true;

    match self.find_stop(FINAL_STOP) {
      Some(idx) => self.select_chunk(buffer, idx),
      None => {
        if let Some(end) = self.region(buffer).map(|region| region.end) {
          buffer.set_selection(end..end);
        }
      },
    }
    tracing::debug!(trigger = %self.trigger, "snippet navigation complete");
    false
  }

  /// Selects the closest previous stop group, returning `false` when there
  /// is none.
  pub fn move_previous<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) -> bool {
    let previous = self
      .stops
      .iter()
      .rev()
      .copied()
      .find(|&stop| self.complete || stop < self.tab_stop);
    let Some((tab_stop, idx)) =
      previous.and_then(|tab_stop| Some((tab_stop, self.find_stop(tab_stop)?)))
    else {
      return false;
    };
    self.tab_stop = tab_stop;
    self.complete = false;
    self.select_chunk(buffer, idx);
    tracing::debug!(trigger = %self.trigger, tab_stop, "snippet stop selected");
    true
  }

  /// Makes the chunk under `offset` the one receiving keystrokes.
  pub fn set_cursor<B: TextBuffer + ?Sized>(&mut self, buffer: &B, offset: usize) {
    if let Some(idx) = self
      .relative(buffer, offset)
      .and_then(|offset| self.chunk_at(offset))
    {
      self.current = Some(idx);
    }
  }

  /// Releases the region anchors and drops the chunk state. The text stays
  /// in the buffer. Calling it again is a no-op.
  pub fn finish<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) {
    let anchors = [self.begin.take(), self.end.take()];
    if anchors.iter().all(Option::is_none) {
      return;
    }
    for anchor in anchors.into_iter().flatten() {
      buffer.release_anchor(anchor);
    }
    self.chunks.clear();
    self.runs.clear();
    self.current = None;
    self.pending_insert = None;
    self.pending_delete.clear();
    tracing::debug!(trigger = %self.trigger, "finished snippet expansion");
  }

  pub fn check_invariant<B: TextBuffer + ?Sized>(&self, buffer: &B) -> Result<(), InvariantViolation> {
    if self.chunks.len() != self.runs.len() {
      return Err(InvariantViolation::CountMismatch {
        chunks: self.chunks.len(),
        runs:   self.runs.len(),
      });
    }
    let region = self.region(buffer).ok_or(InvariantViolation::Released)?;
    let sum: usize = self.runs.iter().sum();
    if sum != region.len() {
      return Err(InvariantViolation::LengthMismatch {
        sum,
        span: region.len(),
      });
    }
    Ok(())
  }
}
