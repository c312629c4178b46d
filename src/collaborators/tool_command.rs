use anyhow::{anyhow, Context};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// External tool invocation with an argument vector. Never goes through a shell.
pub struct ToolCommand {
    inner: Command,
    description: String,
    stdin: Option<String>,
    sensitive: bool,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        let mut inner = Command::new(program);
        inner.kill_on_drop(true);
        Self {
            inner,
            description: program.to_string(),
            stdin: None,
            sensitive: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.description.push(' ');
        self.description.push_str(&arg.as_ref().to_string_lossy());
        self.inner.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn env(mut self, key: &str, val: impl AsRef<OsStr>) -> Self {
        self.inner.env(key, val);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Keeps arguments and output out of logs and errors.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    fn display(&self) -> &str {
        if self.sensitive {
            self.description
                .split(' ')
                .next()
                .unwrap_or_default()
        } else {
            &self.description
        }
    }

    pub async fn run_with_output(mut self) -> anyhow::Result<Output> {
        let shown = self.display().to_string();
        tracing::debug!("running {}", shown);

        self.inner
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = self
            .inner
            .spawn()
            .with_context(|| format!("Failed to execute: {}", shown))?;

        if let Some(input) = self.stdin.take() {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("no stdin pipe for {}", shown))?;
            pipe.write_all(input.as_bytes())
                .await
                .with_context(|| format!("Failed to write stdin of {}", shown))?;
        }

        child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to execute: {}", shown))
    }

    /// Runs to completion and returns stdout, failing on a non-zero exit.
    pub async fn run(self) -> anyhow::Result<String> {
        let display = self.display().to_string();
        let sensitive = self.sensitive;
        let output = self.run_with_output().await?;
        check_success(&output, &display, sensitive)?;
        String::from_utf8(output.stdout).with_context(|| format!("{} printed non-utf8 output", display))
    }
}

pub fn check_success(output: &Output, command_desc: &str, sensitive: bool) -> anyhow::Result<()> {
    if output.status.success() {
        return Ok(());
    }
    if sensitive {
        return Err(anyhow!(
            "command failed: {} ({})",
            command_desc,
            output.status
        ));
    }
    Err(anyhow!(
        "command failed: {} ({}): {}",
        command_desc,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

/// Private scratch directory for tool input and output files, removed on drop.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("defrag-ops")
            .tempdir()
            .context("can't create a scratch directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, content)
            .with_context(|| format!("can't write scratch file {}", name))?;
        Ok(path)
    }

    pub fn read(&self, name: &str) -> anyhow::Result<String> {
        read_file(&self.path(name))
    }
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("can't read {}", path.display()))
}
