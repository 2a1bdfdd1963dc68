//! Parser for the line-oriented `.snippets` format.
//!
//! ```text
//! # comment
//! snippet class
//! - scope c, chdr
//! - desc Declare a type
//! 	typedef struct _${1:Name} $1;
//! 	${0}
//! ```
//!
//! A template starts with a `snippet <trigger>` line, takes optional `-`
//! directives and then one or more body lines, each prefixed by a tab. Blank
//! lines between body lines add newlines. Literal text is accumulated until
//! the next placeholder and flushed into a literal chunk.

use thiserror::Error;

use crate::{
  Tendril,
  syntax::{
    self,
    SyntaxError,
    TokenKind,
    Tokenizer,
  },
  template::{
    ChunkSpec,
    Template,
  },
};

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
  /// 1-based line number.
  pub line:    usize,
  pub message: String,
}

impl ParseError {
  fn new(line: usize, message: impl Into<String>) -> Self {
    Self {
      line,
      message: message.into(),
    }
  }
}

#[derive(Debug, Default)]
struct PendingTemplate {
  trigger:          Tendril,
  scopes:           Vec<Tendril>,
  description:      Option<Tendril>,
  chunks:           Vec<ChunkSpec>,
  text:             String,
  pending_newlines: usize,
  has_body:         bool,
}

impl PendingTemplate {
  fn new(trigger: &str) -> Self {
    Self {
      trigger: trigger.into(),
      ..Self::default()
    }
  }

  fn flush_text(&mut self) {
    if !self.text.is_empty() {
      let text = std::mem::take(&mut self.text);
      self.chunks.push(ChunkSpec::literal(text));
    }
  }

  fn push_chunk(&mut self, chunk: ChunkSpec) {
    self.flush_text();
    self.chunks.push(chunk);
  }

  fn push_body_line(&mut self, line: &str) -> std::result::Result<(), SyntaxError> {
    if self.has_body {
      for _ in 0..=self.pending_newlines {
        self.text.push('\n');
      }
    }
    self.pending_newlines = 0;
    self.has_body = true;

    for token in Tokenizer::new(line) {
      let token = token?;
      match token.kind {
        TokenKind::Text | TokenKind::Escape(_) => self.text.push_str(token.source),
        TokenKind::Nested(inner) => {
          syntax::validate(inner)?;
          self.text.push_str(token.source);
        },
        TokenKind::Stop {
          filters: Some(_), ..
        }
        | TokenKind::Variable { .. } => self.push_chunk(ChunkSpec::literal(token.source)),
        TokenKind::Stop {
          index,
          default: Some(default),
          ..
        } => {
          syntax::validate(default)?;
          self.push_chunk(ChunkSpec::stop(index, default));
        },
        TokenKind::Stop { index, .. } => self.push_chunk(ChunkSpec::stop(index, "")),
      }
    }
    Ok(())
  }

  fn into_templates(mut self, default_language: &str) -> Vec<Template> {
    self.flush_text();
    if !default_language.is_empty() && !self.scopes.iter().any(|s| s == default_language) {
      self.scopes.push(default_language.into());
    }
    if self.scopes.is_empty() {
      self.scopes.push(Tendril::new());
    }

    let Self {
      trigger,
      scopes,
      description,
      chunks,
      ..
    } = self;
    scopes
      .into_iter()
      .map(|language| {
        Template {
          trigger: trigger.clone(),
          language,
          description: description.clone(),
          chunks: chunks.clone(),
        }
      })
      .collect()
  }
}

/// Incremental parser fed one line at a time.
///
/// Templates completed before an error stay available through
/// [`SnippetParser::templates`].
#[derive(Debug, Default)]
pub struct SnippetParser {
  default_language: Tendril,
  templates:        Vec<Template>,
  current:          Option<PendingTemplate>,
  line:             usize,
}

impl SnippetParser {
  /// `default_language` is added to the scopes of every template, usually
  /// the stem of the file being parsed.
  pub fn new(default_language: &str) -> Self {
    Self {
      default_language: default_language.into(),
      ..Self::default()
    }
  }

  pub fn line(&self) -> usize {
    self.line
  }

  pub fn templates(&self) -> &[Template] {
    &self.templates
  }

  pub fn into_templates(mut self) -> Vec<Template> {
    self.finish();
    self.templates
  }

  /// Completes the template being built, if any.
  pub fn finish(&mut self) {
    let Some(pending) = self.current.take() else {
      return;
    };
    if !pending.has_body {
      tracing::warn!(trigger = %pending.trigger, "dropping snippet without a body");
      return;
    }
    let templates = pending.into_templates(&self.default_language);
    self.templates.extend(templates);
  }

  /// Parses `data` line by line, stopping at the first error.
  pub fn parse_str(&mut self, data: &str) -> Result<()> {
    data.lines().try_for_each(|line| self.feed_line(line))
  }

  pub fn feed_line(&mut self, line: &str) -> Result<()> {
    self.line += 1;
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.starts_with('#') {
      return Ok(());
    }

    if let Some(body) = line.strip_prefix('\t') {
      return self.feed_body(body);
    }

    if line.is_empty() {
      if let Some(pending) = self.current.as_mut()
        && pending.has_body
      {
        pending.pending_newlines += 1;
      }
      return Ok(());
    }

    let result = self.feed_header(line);
    if result.is_err() {
      self.finish();
    }
    result
  }

  fn feed_body(&mut self, body: &str) -> Result<()> {
    let Some(pending) = self.current.as_mut() else {
      return Err(ParseError::new(self.line, "body line outside of a snippet"));
    };
    if let Err(err) = pending.push_body_line(body) {
      self.current = None;
      return Err(ParseError::new(self.line, err.to_string()));
    }
    Ok(())
  }

  fn feed_header(&mut self, line: &str) -> Result<()> {
    if let Some(rest) = line.strip_prefix("snippet")
      && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
      let trigger = rest.trim();
      if trigger.is_empty() {
        return Err(ParseError::new(self.line, "snippet without a name"));
      }
      self.finish();
      self.current = Some(PendingTemplate::new(trigger));
      return Ok(());
    }

    if let Some(rest) = line.strip_prefix('-') {
      let Some(pending) = self.current.as_mut() else {
        return Err(ParseError::new(self.line, "directive outside of a snippet"));
      };
      if pending.has_body {
        return Err(ParseError::new(self.line, "directive after the snippet body"));
      }
      let rest = rest.trim();
      let (name, value) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, value)| (name, value.trim()));
      match name {
        "scope" => {
          for scope in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !pending.scopes.iter().any(|s| s == scope) {
              pending.scopes.push(scope.into());
            }
          }
        },
        "desc" => pending.description = Some(value.into()),
        _ => {
          tracing::warn!(directive = name, line = self.line, "unknown snippet directive");
          return Err(ParseError::new(
            self.line,
            format!("unknown directive `{name}`"),
          ));
        },
      }
      return Ok(());
    }

    Err(ParseError::new(self.line, "unexpected line"))
  }
}

/// Parses a whole `.snippets` document.
pub fn parse(data: &str, default_language: &str) -> Result<Vec<Template>> {
  let mut parser = SnippetParser::new(default_language);
  parser.parse_str(data)?;
  Ok(parser.into_templates())
}

/// Parses a bare body without header into a template triggered by `dummy`.
/// Every line of `text` is a body line.
pub fn parse_one(text: &str) -> Result<Template> {
  let mut pending = PendingTemplate::new("dummy");
  for (idx, line) in text.split('\n').enumerate() {
    let line = line.strip_suffix('\r').unwrap_or(line);
    pending
      .push_body_line(line)
      .map_err(|err| ParseError::new(idx + 1, err.to_string()))?;
  }
  pending
    .into_templates("")
    .pop()
    .ok_or_else(|| ParseError::new(1, "empty snippet"))
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::template::LITERAL;

  const SNIPPETS: &str = "\
# GObject helpers
snippet gobj
- scope c, chdr
- desc Declare a type
\ttypedef struct _${1:Name} $1;

\t$0
snippet author
\t/* $author|upper */
";

  #[test]
  fn parses_chunks_and_metadata() {
    let templates = parse(SNIPPETS, "").unwrap();
    assert_eq!(templates.len(), 3);

    let gobj = &templates[0];
    assert_eq!(gobj.trigger, "gobj");
    assert_eq!(gobj.language, "c");
    assert_eq!(gobj.description.as_deref(), Some("Declare a type"));
    assert_eq!(gobj.chunks, vec![
      ChunkSpec::literal("typedef struct _"),
      ChunkSpec::stop(1, "Name"),
      ChunkSpec::literal(" "),
      ChunkSpec::stop(1, ""),
      ChunkSpec::literal(";\n\n"),
      ChunkSpec::stop(0, ""),
    ]);
    assert_eq!(templates[1].language, "chdr");
    assert_eq!(templates[1].chunks, gobj.chunks);

    let author = &templates[2];
    assert_eq!(author.language, "");
    assert_eq!(author.chunks, vec![
      ChunkSpec::literal("/* "),
      ChunkSpec::literal("$author|upper"),
      ChunkSpec::literal(" */"),
    ]);
  }

  #[test]
  fn default_language_joins_scopes() {
    let templates = parse("snippet a\n- scope c\n\tx\n", "c").unwrap();
    assert_eq!(templates.len(), 1);
    let templates = parse("snippet a\n- scope c\n\tx\n", "cpp").unwrap();
    let langs: Vec<_> = templates.iter().map(|t| t.language.as_str()).collect();
    assert_eq!(langs, ["c", "cpp"]);
  }

  #[test]
  fn escapes_stay_in_literal_specs() {
    let templates = parse("snippet cost\n\t\\$${1:5}\n", "").unwrap();
    assert_eq!(templates[0].chunks, vec![
      ChunkSpec::literal("\\$"),
      ChunkSpec::stop(1, "5"),
    ]);
    assert_eq!(templates[0].chunks[0].tab_stop, LITERAL);
  }

  #[test]
  fn trailing_blank_lines_and_crlf() {
    let templates = parse("snippet x\r\n\ta\r\n\r\n\tb\r\n\r\n\r\n", "").unwrap();
    assert_eq!(templates[0].chunks, vec![ChunkSpec::literal("a\n\nb")]);
  }

  #[test]
  fn error_keeps_earlier_templates() {
    let mut parser = SnippetParser::new("");
    let err = parser
      .parse_str("snippet ok\n\tfine\nnot a snippet line\nsnippet later\n\tx\n")
      .unwrap_err();
    assert_eq!(err.line, 3);
    assert_eq!(err.message, "unexpected line");
    let triggers: Vec<_> = parser.templates().iter().map(|t| t.trigger.as_str()).collect();
    assert_eq!(triggers, ["ok"]);
  }

  #[test]
  fn malformed_lines() {
    let line_of = |data: &str| parse(data, "").unwrap_err().line;
    assert_eq!(line_of("\tbody first\n"), 1);
    assert_eq!(line_of("- scope c\n"), 1);
    assert_eq!(line_of("snippet\n"), 1);
    assert_eq!(line_of("snippet a\n- color red\n"), 2);
    assert_eq!(line_of("snippet a\n\tx\n- desc late\n"), 3);
    assert_eq!(line_of("snippet a\n\tx\n\t${1:open\n"), 3);
    assert_eq!(line_of("snippet a\n\tx\n   \n"), 3);
    assert_eq!(line_of("   \nsnippet a\n\tx\n"), 1);
    assert_eq!(line_of("snippet big\n\t$2147483648\n"), 2);

    let mut parser = SnippetParser::new("");
    assert!(parser.parse_str("snippet a\n\tok\n\t${2\n").is_err());
    assert!(parser.into_templates().is_empty());
  }

  #[test]
  fn parse_one_reads_bare_bodies() {
    let template = parse_one("if ($1) {\n\t$0\n}").unwrap();
    assert_eq!(template.trigger, "dummy");
    assert_eq!(template.chunks, vec![
      ChunkSpec::literal("if ("),
      ChunkSpec::stop(1, ""),
      ChunkSpec::literal(") {\n\t"),
      ChunkSpec::stop(0, ""),
      ChunkSpec::literal("\n}"),
    ]);
    assert_eq!(parse_one("ok\n${1:").unwrap_err().line, 2);

    let largest = parse_one("${2147483647:x}").unwrap();
    assert_eq!(largest.chunks, vec![ChunkSpec::stop(i32::MAX, "x")]);
  }
}
