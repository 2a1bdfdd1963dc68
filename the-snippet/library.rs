//! Templates grouped by language, loaded from `.snippets` files.

use std::{
  collections::BTreeMap,
  path::{
    Path,
    PathBuf,
  },
};

use thiserror::Error;

use crate::{
  Tendril,
  parser::{
    ParseError,
    SnippetParser,
  },
  template::Template,
};

pub const SNIPPETS_EXTENSION: &str = "snippets";

#[derive(Debug, Error)]
pub enum LibraryError {
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },
  #[error("{}:{}", path.display(), source)]
  Parse {
    path:   PathBuf,
    source: ParseError,
  },
}

/// Templates of one language in load order.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
  templates: Vec<Template>,
}

impl TemplateSet {
  pub fn push(&mut self, template: Template) {
    self.templates.push(template);
  }

  /// Last template registered for `trigger`, so later files override
  /// earlier ones.
  pub fn get(&self, trigger: &str) -> Option<&Template> {
    self.templates.iter().rev().find(|t| t.trigger == trigger)
  }

  pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Template> {
    self
      .templates
      .iter()
      .filter(move |t| t.trigger.starts_with(prefix))
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Template> {
    self.templates.iter()
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}

impl<'a> IntoIterator for &'a TemplateSet {
  type Item = &'a Template;
  type IntoIter = std::slice::Iter<'a, Template>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

#[derive(Debug, Clone, Default)]
pub struct SnippetLibrary {
  languages: BTreeMap<Tendril, TemplateSet>,
}

impl SnippetLibrary {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, template: Template) {
    self
      .languages
      .entry(template.language.clone())
      .or_default()
      .push(template);
  }

  pub fn extend(&mut self, templates: impl IntoIterator<Item = Template>) {
    for template in templates {
      self.add(template);
    }
  }

  /// Templates declared for `language`. Templates without a scope are
  /// stored under the empty language.
  pub fn get_templates_for_language(&self, language: &str) -> Option<&TemplateSet> {
    self.languages.get(language)
  }

  /// Looks `trigger` up in `language`, then among templates without scope.
  pub fn find(&self, language: &str, trigger: &str) -> Option<&Template> {
    self
      .get_templates_for_language(language)
      .and_then(|set| set.get(trigger))
      .or_else(|| self.get_templates_for_language("")?.get(trigger))
  }

  pub fn languages(&self) -> impl Iterator<Item = &str> {
    self.languages.keys().map(Tendril::as_str)
  }

  pub fn len(&self) -> usize {
    self.languages.values().map(TemplateSet::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Parses `path`, using its file stem as default language. Templates
  /// parsed before an error are kept.
  pub fn load_file(&mut self, path: &Path) -> Result<usize, LibraryError> {
    let data = std::fs::read_to_string(path).map_err(|source| {
      LibraryError::Io {
        path: path.to_path_buf(),
        source,
      }
    })?;
    let language = path
      .file_stem()
      .map(|stem| stem.to_string_lossy())
      .unwrap_or_default();

    let mut parser = SnippetParser::new(&language);
    let result = parser.parse_str(&data);
    let templates = parser.into_templates();
    let count = templates.len();
    self.extend(templates);
    tracing::debug!(path = %path.display(), count, "loaded snippets");

    result.map(|()| count).map_err(|source| {
      LibraryError::Parse {
        path: path.to_path_buf(),
        source,
      }
    })
  }

  /// Loads every `*.snippets` file in `dir`, in name order. Failing files
  /// are skipped and reported; the rest still load.
  pub fn load_dir(&mut self, dir: &Path) -> Vec<LibraryError> {
    let entries = match std::fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(source) => {
        return vec![LibraryError::Io {
          path: dir.to_path_buf(),
          source,
        }];
      },
    };

    let mut paths: Vec<PathBuf> = entries
      .filter_map(|entry| entry.ok().map(|entry| entry.path()))
      .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == SNIPPETS_EXTENSION))
      .collect();
    paths.sort();

    paths
      .iter()
      .filter_map(|path| {
        self
          .load_file(path)
          .inspect_err(|err| tracing::warn!(%err, "skipping snippets"))
          .err()
      })
      .collect()
  }
}

#[cfg(test)]
mod test {
  use std::fs;

  use super::*;

  #[test]
  fn lookup_by_language_trigger_and_prefix() {
    let mut library = SnippetLibrary::new();
    library.extend(crate::parser::parse("snippet for\n\tfor\nsnippet fn\n\tfn\n", "rust").unwrap());
    library.extend(crate::parser::parse("snippet todo\n\tTODO\n", "").unwrap());

    let rust = library.get_templates_for_language("rust").unwrap();
    assert_eq!(rust.len(), 2);
    let prefixed: Vec<_> = rust.with_prefix("f").map(|t| t.trigger.as_str()).collect();
    assert_eq!(prefixed, ["for", "fn"]);
    assert!(library.find("rust", "fn").is_some());
    assert!(library.find("rust", "todo").is_some());
    assert!(library.find("c", "fn").is_none());
    assert_eq!(library.len(), 3);
  }

  #[test]
  fn load_dir_keeps_going_after_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.snippets"), "snippet ok\n\tok\nbroken\n").unwrap();
    fs::write(dir.path().join("b.snippets"), "snippet main\n\tfn main() {}\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "not snippets").unwrap();

    let mut library = SnippetLibrary::new();
    let errors = library.load_dir(dir.path());
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], LibraryError::Parse { source, .. } if source.line == 3));

    assert!(library.find("a", "ok").is_some());
    assert!(library.find("b", "main").is_some());
    let languages: Vec<_> = library.languages().collect();
    assert_eq!(languages, ["a", "b"]);
  }

  #[test]
  fn missing_paths_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = SnippetLibrary::new();
    assert!(matches!(
      library.load_file(&dir.path().join("nope.snippets")),
      Err(LibraryError::Io { .. })
    ));
    assert_eq!(library.load_dir(&dir.path().join("nope")).len(), 1);
  }
}
