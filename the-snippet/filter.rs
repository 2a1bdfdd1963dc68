//! String filters applied to variable references such as `$name|upper`.
//!
//! Every filter is a pure `&str -> String` function. The [`FilterRegistry`]
//! maps filter names to functions and is built once; contexts share it
//! through an [`Arc`]. Unknown filter names are ignored when a chain is
//! applied.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    LazyLock,
  },
};

pub type Filter = fn(&str) -> String;

static BUILTIN: LazyLock<Arc<FilterRegistry>> = LazyLock::new(|| Arc::new(FilterRegistry::builtin()));

#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
  filters: HashMap<&'static str, Filter>,
}

impl FilterRegistry {
  /// A registry without any filter. Every chain applied through it is a no-op.
  pub fn empty() -> Self {
    Self::default()
  }

  /// The registry with every built-in filter.
  pub fn builtin() -> Self {
    Self::empty()
      .with("lower", lower)
      .with("upper", upper)
      .with("capitalize", capitalize)
      .with("decapitalize", decapitalize)
      .with("html", html)
      .with("camelize", camelize)
      .with("functify", functify)
      .with("namespace", namespace)
      .with("class", class)
      .with("instance", instance)
      .with("space", space)
      .with("stripsuffix", strip_suffix)
      .with("slash_to_dots", slash_to_dots)
      .with("descend_path", descend_path)
      .with("snake_case", snake_case)
      .with("kebab_case", kebab_case)
      .with("camel_case", camel_case)
      .with("pascal_case", pascal_case)
  }

  /// Process-wide handle to the built-in registry.
  pub fn shared() -> Arc<Self> {
    Arc::clone(&BUILTIN)
  }

  #[must_use]
  pub fn with(mut self, name: &'static str, filter: Filter) -> Self {
    self.filters.insert(name, filter);
    self
  }

  pub fn get(&self, name: &str) -> Option<Filter> {
    self.filters.get(name).copied()
  }

  /// Applies a `|`-separated chain such as `"functify|upper"` left to right.
  pub fn apply_chain(&self, chain: &str, input: String) -> String {
    chain
      .split('|')
      .filter(|name| !name.is_empty())
      .fold(input, |value, name| {
        match self.get(name) {
          Some(filter) => filter(&value),
          None => {
            tracing::trace!(filter = name, "ignoring unknown snippet filter");
            value
          },
        }
      })
  }
}

pub fn lower(input: &str) -> String {
  input.to_lowercase()
}

pub fn upper(input: &str) -> String {
  input.to_uppercase()
}

/// Uppercases the first character unless it already is uppercase.
pub fn capitalize(input: &str) -> String {
  let mut chars = input.chars();
  match chars.next() {
    Some(first) if !first.is_uppercase() => first.to_uppercase().chain(chars).collect(),
    _ => input.to_string(),
  }
}

/// Lowercases the first character unless it already is lowercase.
pub fn decapitalize(input: &str) -> String {
  let mut chars = input.chars();
  match chars.next() {
    Some(first) if !first.is_lowercase() => first.to_lowercase().chain(chars).collect(),
    _ => input.to_string(),
  }
}

pub fn html(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  for c in input.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      c => out.push(c),
    }
  }
  out
}

/// `gtk_widget` -> `GtkWidget`. Input without separators is only
/// capitalized. A trailing `Private` is dropped.
pub fn camelize(input: &str) -> String {
  if !input.contains(['_', ' ', '-']) {
    return capitalize(input);
  }

  let mut out = String::with_capacity(input.len());
  input.chars().fold(true, |next_is_upper, c| {
    if matches!(c, '_' | '-' | ' ') {
      return true;
    }
    if next_is_upper {
      out.extend(c.to_uppercase());
    } else {
      out.extend(c.to_lowercase());
    }
    false
  });

  if let Some(stripped) = out.strip_suffix("Private") {
    out.truncate(stripped.len());
  }
  out
}

/// `GtkWidget` -> `gtk_widget`. A trailing `_private` is dropped.
pub fn functify(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::with_capacity(input.len() + 4);
  let mut last: Option<char> = None;

  for (idx, &c) in chars.iter().enumerate() {
    let next = chars.get(idx + 1).copied();
    if let Some(last) = last
      && is_word_boundary(last, c, next)
      && !out.ends_with('_')
    {
      out.push('_');
    }

    let c = if matches!(c, ' ' | '-') { '_' } else { c };
    out.extend(c.to_lowercase());
    last = Some(c);
  }

  if let Some(stripped) = out.strip_suffix("_private") {
    out.truncate(stripped.len());
  }
  out
}

/// The leading word of an identifier: `GtkWidget` -> `Gtk`,
/// `gtk_widget` -> `Gtk`.
pub fn namespace(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::new();
  let mut last: Option<char> = None;
  let mut first_is_lower = false;

  for (idx, &c) in chars.iter().enumerate() {
    if c == '_' {
      break;
    }
    let next = chars.get(idx + 1).copied();
    match last {
      Some(last) if is_word_boundary(last, c, next) => break,
      Some(_) => {},
      None => first_is_lower = c.is_lowercase(),
    }
    if matches!(c, ' ' | '-') {
      break;
    }
    out.push(c);
    last = Some(c);
  }

  if first_is_lower { capitalize(&out) } else { out }
}

/// The camelized identifier without its namespace: `gtk_widget` -> `Widget`.
pub fn class(input: &str) -> String {
  let camel = camelize(input);
  let ns = namespace(input);
  match camel.strip_prefix(ns.as_str()) {
    Some(rest) => rest.to_string(),
    None => camel,
  }
}

/// The last word of an identifier: `GtkWidget` -> `widget`.
pub fn instance(input: &str) -> String {
  let functified;
  let input = if input.contains('_') {
    input
  } else {
    functified = functify(input);
    functified.as_str()
  };

  match input.rsplit_once('_') {
    Some((_, last)) => last.to_string(),
    None => input.to_string(),
  }
}

/// As many spaces as the input has characters.
pub fn space(input: &str) -> String {
  " ".repeat(input.chars().count())
}

/// Drops everything from the last `.`: `foo.tar.gz` -> `foo.tar`.
pub fn strip_suffix(input: &str) -> String {
  match input.rfind('.') {
    Some(idx) => input[..idx].to_string(),
    None => input.to_string(),
  }
}

pub fn slash_to_dots(input: &str) -> String {
  input.replace('/', ".")
}

/// Drops the leading path component: `/src/lib/foo.c` -> `lib/foo.c`.
pub fn descend_path(input: &str) -> String {
  input
    .trim_start_matches('/')
    .split_once('/')
    .map(|(_, rest)| rest.to_string())
    .unwrap_or_default()
}

pub fn pascal_case(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  input.chars().fold(true, |word_start, c| {
    if !c.is_alphanumeric() {
      return true;
    }
    if word_start {
      out.extend(c.to_uppercase());
    } else {
      out.extend(c.to_lowercase());
    }
    false
  });
  out
}

pub fn camel_case(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  input.chars().fold((true, true), |(first_word, word_start), c| {
    if !c.is_alphanumeric() {
      return (first_word && word_start, true);
    }
    if first_word || !word_start {
      out.extend(c.to_lowercase());
    } else {
      out.extend(c.to_uppercase());
    }
    (false, false)
  });
  out
}

pub fn snake_case(input: &str) -> String {
  separated_case(input, '_')
}

pub fn kebab_case(input: &str) -> String {
  separated_case(input, '-')
}

/// Lowercases words and joins them with `sep`. Words are split on
/// non-alphanumeric characters and on lowercase -> uppercase transitions.
fn separated_case(input: &str, sep: char) -> String {
  let mut out = String::with_capacity(input.len() + 4);
  // (has_content, prev_was_upper, pending_separator)
  input
    .chars()
    .fold((false, false, false), |(has_content, prev_upper, pending), c| {
      if !c.is_alphanumeric() {
        return (has_content, false, has_content);
      }
      let is_upper = c.is_uppercase();
      if pending || (has_content && is_upper && !prev_upper) {
        out.push(sep);
      }
      out.extend(c.to_lowercase());
      (true, is_upper, false)
    });
  out
}

fn is_word_boundary(last: char, c: char, next: Option<char>) -> bool {
  (last.is_lowercase() && c.is_uppercase())
    || (c.is_uppercase() && next.is_some_and(char::is_lowercase))
}
