//! User configuration for snippet expansion, read from TOML.
//!
//! ```toml
//! tab-width = 2
//! insert-spaces = true
//! snippet-dirs = ["~/snippets"]
//!
//! [variables]
//! author = "Ada Lovelace"
//! email = "ada@example.org"
//! ```

use std::{
  collections::BTreeMap,
  path::{
    Path,
    PathBuf,
  },
};

use etcetera::{
  BaseStrategy,
  choose_base_strategy,
};
use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::context::{
  DEFAULT_RECURSION_LIMIT,
  DEFAULT_TAB_WIDTH,
};

/// Overrides the directory holding `config.toml` and `snippets/`.
pub const CONFIG_DIR_ENV: &str = "THE_SNIP_CONFIG_DIR";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },
  #[error("invalid config: {0}")]
  Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SnippetConfig {
  pub tab_width:       usize,
  pub insert_spaces:   bool,
  /// Maximum nesting of defaults and back-tick sub-templates.
  pub recursion_limit: usize,
  pub snippet_dirs:    Vec<PathBuf>,
  /// Shared variables layered over the built-in ones.
  pub variables:       BTreeMap<String, String>,
}

impl Default for SnippetConfig {
  fn default() -> Self {
    Self {
      tab_width:       DEFAULT_TAB_WIDTH,
      insert_spaces:   true,
      recursion_limit: DEFAULT_RECURSION_LIMIT,
      snippet_dirs:    Vec::new(),
      variables:       BTreeMap::new(),
    }
  }
}

impl SnippetConfig {
  pub fn from_toml_str(data: &str) -> Result<Self> {
    let mut config: Self = toml::from_str(data)?;
    config.snippet_dirs = config
      .snippet_dirs
      .iter()
      .map(|dir| expand_tilde(dir))
      .collect();
    Ok(config)
  }

  pub fn load(path: &Path) -> Result<Self> {
    let data = std::fs::read_to_string(path).map_err(|source| {
      ConfigError::Io {
        path: path.to_path_buf(),
        source,
      }
    })?;
    Self::from_toml_str(&data)
  }

  /// Loads `path` when it exists, the defaults otherwise.
  pub fn load_or_default(path: &Path) -> Result<Self> {
    if path.exists() {
      Self::load(path)
    } else {
      tracing::debug!(path = %path.display(), "no snippet config, using defaults");
      Ok(Self::default())
    }
  }

  /// Configured snippet directories, falling back to the default one.
  pub fn snippet_dirs(&self) -> Vec<PathBuf> {
    if self.snippet_dirs.is_empty() {
      default_snippet_dir().into_iter().collect()
    } else {
      self.snippet_dirs.clone()
    }
  }
}

pub fn config_dir() -> Option<PathBuf> {
  if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
    return Some(expand_tilde(Path::new(&dir)));
  }
  let strategy = choose_base_strategy().ok()?;
  let mut path = strategy.config_dir();
  path.push("the-snip");
  Some(path)
}

pub fn default_config_file() -> Option<PathBuf> {
  config_dir().map(|dir| dir.join("config.toml"))
}

pub fn default_snippet_dir() -> Option<PathBuf> {
  config_dir().map(|dir| dir.join("snippets"))
}

/// Replaces a leading `~` with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let Ok(rest) = path.strip_prefix("~") else {
    return path.to_path_buf();
  };
  match etcetera::home_dir() {
    Ok(home) => home.join(rest),
    Err(_) => path.to_path_buf(),
  }
}
