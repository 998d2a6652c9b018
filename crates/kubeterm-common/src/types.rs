use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl TerminalSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Whether both dimensions are non-zero
    pub fn is_drawable(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// The remote process a session attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub command: Vec<String>,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
            command: vec!["bash".to_string()],
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)?;
        if let Some(container) = &self.container {
            write!(f, ":{}", container)?;
        }
        Ok(())
    }
}

/// Options passed to a remote executor when attaching a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub stdin: bool,
    pub tty: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self { stdin: true, tty: true }
    }
}

/// How a remote stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_code: u32,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        let target = ExecTarget::new("default", "web-0");
        assert_eq!(target.to_string(), "default/web-0");

        let target = target.with_container("nginx");
        assert_eq!(target.to_string(), "default/web-0:nginx");
        assert_eq!(target.command, vec!["bash".to_string()]);
    }

    #[test]
    fn test_empty_sizes_are_not_drawable() {
        assert!(TerminalSize::new(24, 80).is_drawable());
        assert!(!TerminalSize::new(0, 80).is_drawable());
        assert!(!TerminalSize::new(24, 0).is_drawable());
    }

    #[test]
    fn test_size_display() {
        assert_eq!(TerminalSize::new(40, 120).to_string(), "120x40");
    }
}
