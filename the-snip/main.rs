//! `snip`: command-line front end for the snippet engine.

mod cli;

use std::{
  io::Write,
  path::{
    Path,
    PathBuf,
  },
  process::ExitCode,
};

use anyhow::{
  Context,
  Result,
  anyhow,
};
use clap::Parser;
use the_snippet::{
  buffer::RopeBuffer,
  config::{
    self,
    SnippetConfig,
  },
  library::SnippetLibrary,
  parser::SnippetParser,
  session::SnippetSession,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{
  Cli,
  Command,
};

fn main() -> ExitCode {
  let cli = Cli::parse();
  setup_logging(cli.verbosity);

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    },
  }
}

fn setup_logging(verbosity: u8) {
  let level = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
  let config = load_config(cli.config_file.as_deref())?;
  match cli.command {
    Command::Check { files } => {
      let ok = check(&files)?;
      Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    },
    Command::List { language } => {
      let library = load_library(&config, &cli.dirs);
      list(&library, language.as_deref())?;
      Ok(ExitCode::SUCCESS)
    },
    Command::Expand {
      language,
      trigger,
      vars,
      fills,
    } => {
      let library = load_library(&config, &cli.dirs);
      let text = expand(&library, config, &language, &trigger, &vars, &fills)?;
      print!("{text}");
      std::io::stdout().flush()?;
      Ok(ExitCode::SUCCESS)
    },
  }
}

fn load_config(path: Option<&Path>) -> Result<SnippetConfig> {
  match path {
    Some(path) => {
      SnippetConfig::load(path).with_context(|| format!("loading {}", path.display()))
    },
    None => {
      match config::default_config_file() {
        Some(path) => Ok(SnippetConfig::load_or_default(&path)?),
        None => Ok(SnippetConfig::default()),
      }
    },
  }
}

fn load_library(config: &SnippetConfig, extra_dirs: &[PathBuf]) -> SnippetLibrary {
  let mut library = SnippetLibrary::new();
  for dir in config.snippet_dirs().iter().chain(extra_dirs) {
    if !dir.is_dir() {
      tracing::debug!(dir = %dir.display(), "snippet directory does not exist");
      continue;
    }
    for err in library.load_dir(dir) {
      tracing::warn!(%err, "failed to load snippets");
    }
  }
  library
}

/// Parses every file, returning whether all of them are valid.
fn check(files: &[PathBuf]) -> Result<bool> {
  let mut failed = false;
  for path in files {
    let data =
      std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let language = path
      .file_stem()
      .map(|stem| stem.to_string_lossy())
      .unwrap_or_default();
    let mut parser = SnippetParser::new(&language);
    match parser.parse_str(&data) {
      Ok(()) => {
        let count = parser.into_templates().len();
        println!("{}: {count} templates", path.display());
      },
      Err(err) => {
        failed = true;
        println!("{}:{err}", path.display());
      },
    }
  }
  Ok(!failed)
}

fn list(library: &SnippetLibrary, language: Option<&str>) -> Result<()> {
  let mut out = std::io::stdout().lock();
  for lang in library.languages() {
    if language.is_some_and(|wanted| wanted != lang) {
      continue;
    }
    let Some(set) = library.get_templates_for_language(lang) else {
      continue;
    };
    for template in set {
      let lang = if lang.is_empty() { "*" } else { lang };
      match &template.description {
        Some(desc) => writeln!(out, "{lang}\t{}\t{desc}", template.trigger)?,
        None => writeln!(out, "{lang}\t{}", template.trigger)?,
      }
    }
  }
  Ok(())
}

fn expand(
  library: &SnippetLibrary,
  config: SnippetConfig,
  language: &str,
  trigger: &str,
  vars: &[(String, String)],
  fills: &[String],
) -> Result<String> {
  let template = library
    .find(language, trigger)
    .ok_or_else(|| anyhow!("no snippet `{trigger}` for language `{language}`"))?;

  let mut session = SnippetSession::with_config(RopeBuffer::new(), config);
  for (key, value) in vars {
    session.set_shared(key, value.as_str());
  }

  let mut active = session.push(template, 0);
  for fill in fills {
    if !active {
      tracing::warn!(fill = fill.as_str(), "no stop left to fill");
      break;
    }
    session.replace_selection(fill);
    active = session.move_next();
  }
  Ok(session.into_buffer().to_string())
}

#[cfg(test)]
mod test {
  use std::fs;

  use super::*;

  fn library_from(dir: &Path) -> SnippetLibrary {
    let config = SnippetConfig {
      snippet_dirs: vec![dir.to_path_buf()],
      ..SnippetConfig::default()
    };
    load_library(&config, &[])
  }

  #[test]
  fn expand_types_fills_into_stops() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
      dir.path().join("rust.snippets"),
      "snippet fn\n\tfn ${1:name}(${2}) {\n\t\t$0\n\t}\n",
    )
    .unwrap();
    let library = library_from(dir.path());

    let text = expand(
      &library,
      SnippetConfig::default(),
      "rust",
      "fn",
      &[],
      &["main".to_string()],
    )
    .unwrap();
    assert_eq!(text, "fn main() {\n    \n}");
  }

  #[test]
  fn expand_uses_command_line_variables() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("c.snippets"), "snippet by\n\t/* $author */\n").unwrap();
    let library = library_from(dir.path());
    let vars = [("author".to_string(), "Ada".to_string())];
    let text = expand(&library, SnippetConfig::default(), "c", "by", &vars, &[]).unwrap();
    assert_eq!(text, "/* Ada */");
    assert!(expand(&library, SnippetConfig::default(), "c", "nope", &vars, &[]).is_err());
  }

  #[test]
  fn check_flags_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.snippets");
    let bad = dir.path().join("bad.snippets");
    fs::write(&good, "snippet a\n\tx\n").unwrap();
    fs::write(&bad, "oops\n").unwrap();
    assert!(check(&[good.clone()]).unwrap());
    assert!(!check(&[good, bad]).unwrap());
  }
}
