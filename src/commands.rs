//! Out-of-band command execution.
//!
//! A command event names a kind and carries a data string. The kind selects a
//! [`CommandRunner`]; the runner's status and captured output go back to the
//! caller instead of an HTTP response.

use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use std::sync::Arc;

use lambda_runtime::tracing::{info, warn};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Evaluate a code snippet in the application's runtime.
    Exec,
    /// Run a shell command line.
    Shell,
    /// Framework management command.
    Manage,
    /// Framework CLI group.
    Cli,
}

impl CommandKind {
    /// Maps the wire tag to a kind. `flask` is accepted as an alias of `cli`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "exec" => Some(Self::Exec),
            "command" => Some(Self::Shell),
            "manage" => Some(Self::Manage),
            "cli" | "flask" => Some(Self::Cli),
            _ => None,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Shell => "command",
            Self::Manage => "manage",
            Self::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: i32,
    pub output: String,
}

impl CommandOutcome {
    #[must_use]
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            status: 1,
            output: output.into(),
        }
    }

    /// `[status, output]`, or the bare output text in legacy mode.
    #[must_use]
    pub fn render(&self, legacy: bool) -> Value {
        if legacy {
            Value::String(self.output.clone())
        } else {
            json!([self.status, self.output])
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Failures are reported through the outcome, never raised.
    fn run(&self, data: &str) -> CommandOutcome;
}

/// Runs `data` through `sh -c`, capturing stdout followed by stderr.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, data: &str) -> CommandOutcome {
        match Command::new("sh").arg("-c").arg(data).output() {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutcome {
                    status: output.status.code().unwrap_or(1),
                    output: text,
                }
            }
            Err(e) => CommandOutcome::failure(format!("Failed to run shell: {e}")),
        }
    }
}

/// Splits a command line into arguments. Single and double quotes group
/// words; a backslash escapes the next character outside single quotes.
#[must_use]
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}

type ArgvHandler = Box<dyn Fn(&[String]) -> anyhow::Result<String> + Send + Sync>;

/// Adapts an argument-vector handler, such as a framework's management entry
/// point, to [`CommandRunner`]. `Ok` output has status 0; an error is
/// reported as its message with status 1.
pub struct ArgvRunner {
    handler: ArgvHandler,
}

impl ArgvRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for ArgvRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgvRunner").finish_non_exhaustive()
    }
}

impl CommandRunner for ArgvRunner {
    fn run(&self, data: &str) -> CommandOutcome {
        let args = split_args(data);
        match (self.handler)(&args) {
            Ok(output) => CommandOutcome { status: 0, output },
            Err(e) => CommandOutcome::failure(format!("{e:#}\n")),
        }
    }
}

/// Runners per command kind.
pub struct CommandRegistry {
    runners: HashMap<CommandKind, Arc<dyn CommandRunner>>,
}

impl Default for CommandRegistry {
    /// Only shell commands are available by default.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CommandKind::Shell, ShellRunner);
        registry
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.runners.keys().map(|kind| kind.tag()).collect();
        kinds.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl CommandRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    pub fn register<R>(&mut self, kind: CommandKind, runner: R)
    where
        R: CommandRunner + 'static,
    {
        self.runners.insert(kind, Arc::new(runner));
    }

    /// Runs the command named by `tag`.
    #[must_use]
    pub fn dispatch(&self, tag: &str, data: &str) -> CommandOutcome {
        let Some(kind) = CommandKind::from_tag(tag) else {
            warn!(command = %tag, "Unknown command");
            return CommandOutcome::failure(format!("Unknown command: {tag}"));
        };
        let Some(runner) = self.runners.get(&kind) else {
            warn!(command = %tag, "No runner registered");
            return CommandOutcome::failure(format!("No runner registered for command: {tag}"));
        };

        info!(command = %tag, "Running command");
        let outcome = runner.run(data);
        info!(command = %tag, status = outcome.status, "Command finished");
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tags() {
        assert_eq!(CommandKind::from_tag("exec"), Some(CommandKind::Exec));
        assert_eq!(CommandKind::from_tag("command"), Some(CommandKind::Shell));
        assert_eq!(CommandKind::from_tag("manage"), Some(CommandKind::Manage));
        assert_eq!(CommandKind::from_tag("flask"), Some(CommandKind::Cli));
        assert_eq!(CommandKind::from_tag("cli"), Some(CommandKind::Cli));
        assert_eq!(CommandKind::from_tag("unknown"), None);
    }

    #[test]
    fn test_render() {
        let outcome = CommandOutcome {
            status: 0,
            output: "5\n".to_string(),
        };
        assert_eq!(outcome.render(false), json!([0, "5\n"]));
        assert_eq!(outcome.render(true), json!("5\n"));
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args("check --list-tags"),
            vec!["check", "--list-tags"]
        );
        assert_eq!(
            split_args(r#"say "hello world" 'it''s' a\ b"#),
            vec!["say", "hello world", "its", "a b"]
        );
        assert_eq!(split_args(r#"empty """#), vec!["empty", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_shell_runner() {
        let outcome = ShellRunner.run(r#"echo "hello world""#);
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.output, "hello world\n");

        let outcome = ShellRunner.run("echo oops >&2; exit 3");
        assert_eq!(outcome.status, 3);
        assert_eq!(outcome.output, "oops\n");
    }

    #[test]
    fn test_argv_runner() {
        let runner = ArgvRunner::new(|args| Ok(format!("Called with: {}\n", args.join(", "))));
        let outcome = runner.run("check --list-tags");
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.output, "Called with: check, --list-tags\n");

        let failing = ArgvRunner::new(|_| anyhow::bail!("no such command"));
        let outcome = failing.run("x");
        assert_eq!(outcome.status, 1);
        assert_eq!(outcome.output, "no such command\n");
    }

    #[test]
    fn test_dispatch_unknown_and_unregistered() {
        let registry = CommandRegistry::default();

        let outcome = registry.dispatch("unknown", "echo hi");
        assert_eq!(
            outcome,
            CommandOutcome::failure("Unknown command: unknown")
        );

        let outcome = registry.dispatch("manage", "check");
        assert_eq!(
            outcome,
            CommandOutcome::failure("No runner registered for command: manage")
        );
    }

    #[test]
    fn test_dispatch_uses_registered_runner() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|data| data == "print(1+4)")
            .times(1)
            .returning(|_| CommandOutcome {
                status: 0,
                output: "5\n".to_string(),
            });

        let mut registry = CommandRegistry::empty();
        registry.register(CommandKind::Exec, runner);

        assert_eq!(
            registry.dispatch("exec", "print(1+4)").render(true),
            json!("5\n")
        );
    }
}
