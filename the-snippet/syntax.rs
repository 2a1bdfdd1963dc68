//! Placeholder syntax shared by the template parser and the renderer.
//!
//! A spec string is a sequence of [`Token`]s:
//!
//! | Syntax | Token |
//! |--------|-------|
//! | `\X` | [`TokenKind::Escape`] |
//! | `$N`, `${N}` | [`TokenKind::Stop`] without default |
//! | `${N:inner}` | [`TokenKind::Stop`] with default `inner` |
//! | `$N\|f`, `${N\|f\|g}` | [`TokenKind::Stop`] with a filter chain |
//! | `$name\|f`, `${name\|f}` | [`TokenKind::Variable`] |
//! | `` `inner` `` | [`TokenKind::Nested`] |
//!
//! Everything else is [`TokenKind::Text`]. A `$` that does not start a
//! placeholder, an unterminated back-tick and a trailing `\` are plain text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyntaxError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxError {
  #[error("unterminated placeholder starting at byte {pos}")]
  Unterminated { pos: usize },
  #[error("malformed placeholder at byte {pos}")]
  Malformed { pos: usize },
}

impl SyntaxError {
  fn shifted(self, by: usize) -> Self {
    match self {
      Self::Unterminated { pos } => Self::Unterminated { pos: pos + by },
      Self::Malformed { pos } => Self::Malformed { pos: pos + by },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
  Text,
  Escape(char),
  Stop {
    /// Non-negative, at most `i32::MAX`.
    index:   i32,
    default: Option<&'a str>,
    /// `|`-separated filter names, without the leading `|`.
    filters: Option<&'a str>,
  },
  Variable {
    name:    &'a str,
    filters: Option<&'a str>,
  },
  Nested(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
  pub kind:   TokenKind<'a>,
  /// Byte index of the token in the tokenized input.
  pub start:  usize,
  /// The token exactly as written.
  pub source: &'a str,
}

#[derive(Debug)]
pub struct Tokenizer<'a> {
  input: &'a str,
  pos:   usize,
}

impl<'a> Tokenizer<'a> {
  pub fn new(input: &'a str) -> Self {
    Self { input, pos: 0 }
  }

  fn byte(&self) -> Option<u8> {
    self.input.as_bytes().get(self.pos).copied()
  }

  fn peek_byte(&self) -> Option<u8> {
    self.input.as_bytes().get(self.pos + 1).copied()
  }

  fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
    Token {
      kind,
      start,
      source: &self.input[start..self.pos],
    }
  }

  fn take_while(&mut self, f: impl Fn(u8) -> bool) -> &'a str {
    let start = self.pos;
    self.pos += self.input[start..].bytes().take_while(|&b| f(b)).count();
    &self.input[start..self.pos]
  }

  fn parse_text(&mut self) -> Token<'a> {
    let start = self.pos;
    self.pos += self.input[start..]
      .find(['\\', '$', '`'])
      .unwrap_or(self.input.len() - start);
    self.token(TokenKind::Text, start)
  }

  fn parse_escape(&mut self) -> Token<'a> {
    let start = self.pos;
    self.pos += 1;
    match self.input[self.pos..].chars().next() {
      Some(c) => {
        self.pos += c.len_utf8();
        self.token(TokenKind::Escape(c), start)
      },
      None => self.token(TokenKind::Text, start),
    }
  }

  fn parse_nested(&mut self) -> Token<'a> {
    let start = self.pos;
    match find_unescaped(&self.input[start + 1..], b'`') {
      Some(len) => {
        let inner = &self.input[start + 1..start + 1 + len];
        self.pos = start + len + 2;
        self.token(TokenKind::Nested(inner), start)
      },
      None => {
        self.pos += 1;
        self.token(TokenKind::Text, start)
      },
    }
  }

  /// Parses an optional `|f|g` chain following a bare placeholder. A `|`
  /// not followed by a filter name is left in the input.
  fn parse_bare_filters(&mut self) -> Option<&'a str> {
    let start = self.pos + 1;
    let mut end = self.pos;
    while self.byte() == Some(b'|') && self.peek_byte().is_some_and(is_filter_byte) {
      self.pos += 1;
      self.take_while(is_filter_byte);
      end = self.pos;
    }
    (end > start).then(|| &self.input[start..end])
  }

  /// Parses `|f|g}` inside braces. The cursor is on the `|`.
  fn parse_braced_filters(&mut self, open: usize) -> Result<&'a str> {
    let start = self.pos + 1;
    while self.byte() == Some(b'|') {
      self.pos += 1;
      if self.take_while(is_filter_byte).is_empty() {
        return Err(SyntaxError::Malformed { pos: self.pos });
      }
    }
    let filters = &self.input[start..self.pos];
    self.expect_close(open)?;
    Ok(filters)
  }

  fn expect_close(&mut self, open: usize) -> Result<()> {
    match self.byte() {
      Some(b'}') => {
        self.pos += 1;
        Ok(())
      },
      Some(_) => Err(SyntaxError::Malformed { pos: self.pos }),
      None => Err(SyntaxError::Unterminated { pos: open }),
    }
  }

  /// Stop numbers beyond `i32::MAX` are malformed.
  fn parse_index(&mut self) -> Result<i32> {
    let pos = self.pos;
    self
      .take_while(|b| b.is_ascii_digit())
      .parse()
      .map_err(|_| SyntaxError::Malformed { pos })
  }

  /// Parses the placeholder under the cursor, which is on a `$`. Returns
  /// `None` when the `$` does not start a placeholder.
  fn parse_dollar(&mut self) -> Option<Result<Token<'a>>> {
    let start = self.pos;
    let kind = match self.peek_byte()? {
      b'0'..=b'9' => {
        self.pos += 1;
        let index = match self.parse_index() {
          Ok(index) => index,
          Err(err) => return Some(Err(err)),
        };
        let filters = self.parse_bare_filters();
        TokenKind::Stop {
          index,
          default: None,
          filters,
        }
      },
      b if b.is_ascii_alphabetic() => {
        self.pos += 1;
        let name = self.take_while(is_name_byte);
        let filters = self.parse_bare_filters();
        TokenKind::Variable { name, filters }
      },
      b'{' => {
        self.pos += 2;
        match self.parse_braced(start) {
          Ok(kind) => kind,
          Err(err) => return Some(Err(err)),
        }
      },
      _ => return None,
    };
    Some(Ok(self.token(kind, start)))
  }

  fn parse_braced(&mut self, open: usize) -> Result<TokenKind<'a>> {
    match self.byte() {
      Some(b'0'..=b'9') => {
        let index = self.parse_index()?;
        match self.byte() {
          Some(b':') => {
            self.pos += 1;
            let inner_start = self.pos;
            let len = find_closing_brace(&self.input[inner_start..])
              .ok_or(SyntaxError::Unterminated { pos: open })?;
            self.pos = inner_start + len + 1;
            Ok(TokenKind::Stop {
              index,
              default: Some(&self.input[inner_start..inner_start + len]),
              filters: None,
            })
          },
          Some(b'|') => {
            let filters = self.parse_braced_filters(open)?;
            Ok(TokenKind::Stop {
              index,
              default: None,
              filters: Some(filters),
            })
          },
          _ => {
            self.expect_close(open)?;
            Ok(TokenKind::Stop {
              index,
              default: None,
              filters: None,
            })
          },
        }
      },
      Some(b) if b.is_ascii_alphabetic() => {
        let name = self.take_while(is_name_byte);
        let filters = match self.byte() {
          Some(b'|') => Some(self.parse_braced_filters(open)?),
          _ => {
            self.expect_close(open)?;
            None
          },
        };
        Ok(TokenKind::Variable { name, filters })
      },
      Some(_) => Err(SyntaxError::Malformed { pos: self.pos }),
      None => Err(SyntaxError::Unterminated { pos: open }),
    }
  }
}

impl<'a> Iterator for Tokenizer<'a> {
  type Item = Result<Token<'a>>;

  fn next(&mut self) -> Option<Self::Item> {
    let byte = self.byte()?;
    match byte {
      b'\\' => Some(Ok(self.parse_escape())),
      b'`' => Some(Ok(self.parse_nested())),
      b'$' => {
        match self.parse_dollar() {
          Some(result) => Some(result),
          None => {
            let start = self.pos;
            self.pos += 1;
            Some(Ok(self.token(TokenKind::Text, start)))
          },
        }
      },
      _ => Some(Ok(self.parse_text())),
    }
  }
}

pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
  Tokenizer::new(input).collect()
}

/// Checks `input` and every default and nested spec inside it.
pub fn validate(input: &str) -> Result<()> {
  for token in Tokenizer::new(input) {
    let token = token?;
    let (inner, offset) = match token.kind {
      TokenKind::Stop {
        default: Some(inner),
        ..
      } => {
        let colon = token.source.find(':').unwrap_or_default();
        (inner, token.start + colon + 1)
      },
      TokenKind::Nested(inner) => (inner, token.start + 1),
      _ => continue,
    };
    validate(inner).map_err(|err| err.shifted(offset))?;
  }
  Ok(())
}

fn is_name_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

fn is_filter_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the text before the `}` closing an already opened `${`,
/// skipping escaped characters and balanced inner braces.
fn find_closing_brace(input: &str) -> Option<usize> {
  let bytes = input.as_bytes();
  let mut level = 1usize;
  let mut idx = 0;
  while idx < bytes.len() {
    match bytes[idx] {
      b'\\' => idx += 1,
      b'{' => level += 1,
      b'}' => {
        level -= 1;
        if level == 0 {
          return Some(idx);
        }
      },
      _ => {},
    }
    idx += 1;
  }
  None
}

fn find_unescaped(input: &str, needle: u8) -> Option<usize> {
  let bytes = input.as_bytes();
  let mut idx = 0;
  while idx < bytes.len() {
    match bytes[idx] {
      b'\\' => idx += 1,
      b if b == needle => return Some(idx),
      _ => {},
    }
    idx += 1;
  }
  None
}

#[cfg(test)]
mod test {
  use super::*;

  fn kinds(input: &str) -> Vec<TokenKind<'_>> {
    tokenize(input)
      .unwrap()
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn literal_text_and_escapes() {
    assert_eq!(kinds("foo"), vec![TokenKind::Text]);
    assert_eq!(kinds(r"a\$b"), vec![
      TokenKind::Text,
      TokenKind::Escape('$'),
      TokenKind::Text
    ]);
    assert_eq!(kinds(r"\\"), vec![TokenKind::Escape('\\')]);
    assert_eq!(kinds("a\\"), vec![TokenKind::Text, TokenKind::Text]);
  }

  #[test]
  fn stops() {
    let stop = |index, default, filters| {
      TokenKind::Stop {
        index,
        default,
        filters,
      }
    };
    assert_eq!(kinds("$1"), vec![stop(1, None, None)]);
    assert_eq!(kinds("${12}"), vec![stop(12, None, None)]);
    assert_eq!(kinds("${1:foo}"), vec![stop(1, Some("foo"), None)]);
    assert_eq!(kinds("${1:{a} ${2:b}}"), vec![stop(
      1,
      Some("{a} ${2:b}"),
      None
    )]);
    assert_eq!(kinds(r"${1:a\}b}"), vec![stop(1, Some(r"a\}b"), None)]);
    assert_eq!(kinds("$1|upper"), vec![stop(1, None, Some("upper"))]);
    assert_eq!(kinds("${1|lower|upper}"), vec![stop(
      1,
      None,
      Some("lower|upper")
    )]);
  }

  #[test]
  fn variables() {
    let tokens = tokenize("$name|functify|upper!").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Variable {
      name:    "name",
      filters: Some("functify|upper"),
    });
    assert_eq!(tokens[0].source, "$name|functify|upper");
    assert_eq!(tokens[1].source, "!");

    assert_eq!(kinds("${author}"), vec![TokenKind::Variable {
      name:    "author",
      filters: None,
    }]);
    // A pipe without a filter name stays text.
    assert_eq!(kinds("$a| b"), vec![
      TokenKind::Variable {
        name:    "a",
        filters: None,
      },
      TokenKind::Text,
    ]);
  }

  #[test]
  fn lone_dollar_and_backticks() {
    assert_eq!(kinds("$ $"), vec![
      TokenKind::Text,
      TokenKind::Text,
      TokenKind::Text
    ]);
    assert_eq!(kinds("`$filename`"), vec![TokenKind::Nested("$filename")]);
    assert_eq!(kinds("`open"), vec![TokenKind::Text, TokenKind::Text]);
  }

  #[test]
  fn errors_carry_positions() {
    assert_eq!(
      tokenize("ab${1:foo").unwrap_err(),
      SyntaxError::Unterminated { pos: 2 }
    );
    assert_eq!(tokenize("${1x}").unwrap_err(), SyntaxError::Malformed {
      pos: 3,
    });
    assert_eq!(tokenize("${}").unwrap_err(), SyntaxError::Malformed {
      pos: 2,
    });
    assert_eq!(tokenize("${a|}").unwrap_err(), SyntaxError::Malformed {
      pos: 4,
    });
    assert_eq!(
      validate("x${1:${2:y}").unwrap_err(),
      SyntaxError::Unterminated { pos: 1 }
    );
    assert_eq!(
      validate("${1:a${2b}}").unwrap_err(),
      SyntaxError::Malformed { pos: 8 }
    );
  }

  #[test]
  fn stop_numbers_fit_in_i32() {
    assert!(matches!(
      tokenize("$2147483647").unwrap()[0].kind,
      TokenKind::Stop {
        index: i32::MAX,
        ..
      }
    ));
    assert_eq!(tokenize("a $2147483648").unwrap_err(), SyntaxError::Malformed {
      pos: 3,
    });
    assert_eq!(
      tokenize("${99999999999:x}").unwrap_err(),
      SyntaxError::Malformed { pos: 2 }
    );
  }
}
