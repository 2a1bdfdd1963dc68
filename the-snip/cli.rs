use std::path::PathBuf;

use anyhow::{
  Result,
  bail,
};
use clap::{
  ArgAction,
  Parser,
  Subcommand,
};

#[derive(Parser, Debug)]
#[command(name = "snip", about = "Check, list and expand snippet templates", long_about = None)]
pub struct Cli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count, global = true)]
  pub verbosity: u8,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
  pub config_file: Option<PathBuf>,

  /// Additional snippet directory (repeatable)
  #[arg(long = "dir", value_name = "DIR", global = true)]
  pub dirs: Vec<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Parse snippet files and report errors
  Check {
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,
  },
  /// List the templates found in the snippet directories
  List {
    /// Only list templates of this language
    #[arg(long = "lang", value_name = "LANG")]
    language: Option<String>,
  },
  /// Expand a template and print the result
  Expand {
    #[arg(value_name = "LANG")]
    language: String,
    #[arg(value_name = "TRIGGER")]
    trigger:  String,
    /// Set a shared variable
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars:     Vec<(String, String)>,
    /// Text typed into successive stops
    #[arg(long = "fill", value_name = "TEXT")]
    fills:    Vec<String>,
  },
}

fn parse_var(arg: &str) -> Result<(String, String)> {
  let Some((key, value)) = arg.split_once('=') else {
    bail!("expected KEY=VALUE, got `{arg}`");
  };
  if key.is_empty() {
    bail!("variable name is empty in `{arg}`");
  }
  Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parses_expand_arguments() {
    let cli = Cli::try_parse_from([
      "snip", "-vv", "expand", "rust", "fn", "--var", "author=Ada", "--fill", "main",
    ])
    .unwrap();
    assert_eq!(cli.verbosity, 2);
    match cli.command {
      Command::Expand {
        language,
        trigger,
        vars,
        fills,
      } => {
        assert_eq!((language.as_str(), trigger.as_str()), ("rust", "fn"));
        assert_eq!(vars, [("author".to_string(), "Ada".to_string())]);
        assert_eq!(fills, ["main"]);
      },
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn rejects_malformed_variables() {
    assert!(parse_var("novalue").is_err());
    assert!(parse_var("=x").is_err());
    assert_eq!(parse_var("a=b=c").unwrap(), ("a".into(), "b=c".into()));
    assert!(Cli::try_parse_from(["snip", "check"]).is_err());
  }
}
