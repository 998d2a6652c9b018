use kubeterm_common::types::{ExecTarget, StreamOptions};
use portable_pty::CommandBuilder;
use std::fmt;
use std::path::PathBuf;

/// A program plus arguments to run inside a pseudo-terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl ExecCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: vec![("TERM".to_string(), "xterm-256color".to_string())],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Decides what to spawn for a given target
#[derive(Debug, Clone)]
pub enum Launcher {
    /// `kubectl exec` into the target pod
    Kubectl {
        binary: String,
        kubeconfig: Option<PathBuf>,
        context: Option<String>,
    },
    /// A shell on this machine; the target is ignored
    LocalShell { shell: Option<String> },
    /// Always run the same command
    Fixed(ExecCommand),
}

impl Launcher {
    pub fn kubectl() -> Self {
        Launcher::Kubectl {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            context: None,
        }
    }

    pub fn command_for(&self, target: &ExecTarget, options: StreamOptions) -> ExecCommand {
        match self {
            Launcher::Kubectl {
                binary,
                kubeconfig,
                context,
            } => {
                let mut cmd = ExecCommand::new(binary.as_str());
                if let Some(path) = kubeconfig {
                    cmd = cmd.arg("--kubeconfig").arg(path.to_string_lossy());
                }
                if let Some(context) = context {
                    cmd = cmd.arg("--context").arg(context.as_str());
                }
                cmd = cmd.arg("exec");
                if options.stdin {
                    cmd = cmd.arg("-i");
                }
                if options.tty {
                    cmd = cmd.arg("-t");
                }
                cmd = cmd.arg("-n").arg(target.namespace.as_str()).arg(target.pod.as_str());
                if let Some(container) = &target.container {
                    cmd = cmd.arg("-c").arg(container.as_str());
                }
                cmd.arg("--").args(target.command.iter().cloned())
            }
            Launcher::LocalShell { shell } => {
                let shell = shell
                    .clone()
                    .or_else(|| std::env::var("SHELL").ok())
                    .unwrap_or_else(|| "/bin/sh".to_string());
                ExecCommand::new(shell).env("COLORTERM", "truecolor")
            }
            Launcher::Fixed(cmd) => cmd.clone(),
        }
    }
}
