// conductor/src/command.rs

//! How hooks and process-based launchers describe the command they run.

use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

/// Either a shell command string (`command`) or an executable with an argv
/// (`exe` + `args`). When both are present, `exe` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandLine {
  #[serde(default)]
  pub command: Option<String>,
  #[serde(default)]
  pub exe: Option<String>,
  #[serde(default)]
  pub args: Vec<String>,
}

impl CommandLine {
  pub fn shell(command: impl Into<String>) -> Self {
    Self {
      command: Some(command.into()),
      ..Default::default()
    }
  }

  pub fn exe<I, S>(exe: impl Into<String>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      command: None,
      exe: Some(exe.into()),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.exe.as_deref().map_or(true, str::is_empty) && self.command.as_deref().map_or(true, str::is_empty)
  }

  /// Copy with every occurrence of `placeholder` in `command`, `exe` and `args`
  /// replaced by `value`.
  pub fn substitute(&self, placeholder: &str, value: &str) -> Self {
    let replace = |s: &String| s.replace(placeholder, value);
    Self {
      command: self.command.as_ref().map(replace),
      exe: self.exe.as_ref().map(replace),
      args: self.args.iter().map(replace).collect(),
    }
  }

  /// Human-readable form for logs.
  pub fn display(&self) -> String {
    match (&self.exe, &self.command) {
      (Some(exe), _) if !self.args.is_empty() => format!("{} {}", exe, self.args.join(" ")),
      (Some(exe), _) => exe.clone(),
      (None, Some(command)) => command.clone(),
      (None, None) => String::new(),
    }
  }

  /// Builds the child command with piped stdout/stderr and a null stdin.
  ///
  /// Returns `None` when neither `exe` nor `command` is set.
  pub fn to_command(&self) -> Option<Command> {
    let mut cmd = match (&self.exe, &self.command) {
      (Some(exe), _) if !exe.is_empty() => {
        let mut cmd = Command::new(exe);
        cmd.args(&self.args);
        cmd
      }
      (_, Some(command)) if !command.is_empty() => shell_command(command),
      _ => return None,
    };
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    Some(cmd)
  }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(command);
  cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
  let mut cmd = Command::new("cmd");
  cmd.arg("/C").arg(command);
  cmd
}
