//! Effective-POM expansion through the Maven build tool.
//!
//! [`Expander`] shells out to the configured program (default `mvn`) with
//! `-T10 help:effective-pom -f <input> -Doutput=<output>`, streams the tool's
//! output into the log, and captures the expanded descriptor bytes.
//!
//! A non-zero tool exit is not an `Err`: it is reported through
//! [`Expansion::status`] so the caller can decide on a fallback. Errors are
//! reserved for spawn and I/O failures.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use pomwatch_shared::{ExpanderConfig, PomwatchError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Descriptor filename expected inside a snapshot directory.
const LOCAL_DESCRIPTOR: &str = "pom.xml";

/// Output filename written next to a snapshot descriptor.
const LOCAL_OUTPUT: &str = "effective-pom.xml";

/// Outcome of one expansion run.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Build tool exit status; zero means success.
    pub status: i32,
    /// Expanded descriptor bytes; empty when the tool wrote no output.
    pub output: Vec<u8>,
}

impl Expansion {
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Runs the build tool to expand descriptors into effective form.
pub struct Expander {
    program: String,
}

impl Expander {
    pub fn new(config: &ExpanderConfig) -> Self {
        Self {
            program: config.program.clone(),
        }
    }

    /// Expand raw descriptor bytes through scoped temporary files.
    ///
    /// Both temp files carry an `.xml` suffix so the tool recognizes them,
    /// and both are removed when this call returns, on every path.
    pub async fn expand(&self, descriptor: &[u8]) -> Result<Expansion> {
        let mut input = named_xml_tempfile()?;
        input
            .write_all(descriptor)
            .and_then(|_| input.flush())
            .map_err(|e| PomwatchError::io(input.path(), e))?;
        let output = named_xml_tempfile()?;

        let status = self.run_tool(input.path(), output.path()).await?;
        let expanded = read_output(output.path(), status)?;
        Ok(Expansion {
            status,
            output: expanded,
        })
    }

    /// Expand a descriptor in place inside an unpacked snapshot directory.
    ///
    /// Reads `<dir>/pom.xml` and writes `<dir>/effective-pom.xml`.
    pub async fn expand_local(&self, dir: &Path) -> Result<Expansion> {
        let input = dir.join(LOCAL_DESCRIPTOR);
        if !input.exists() {
            return Err(PomwatchError::validation(format!(
                "no {LOCAL_DESCRIPTOR} in {}",
                dir.display()
            )));
        }
        let output = dir.join(LOCAL_OUTPUT);

        let status = self.run_tool(&input, &output).await?;
        let expanded = read_output(&output, status)?;
        Ok(Expansion {
            status,
            output: expanded,
        })
    }

    /// Spawn the tool, stream its output into the log, and wait for exit.
    async fn run_tool(&self, input: &Path, output: &Path) -> Result<i32> {
        let mut output_arg = OsString::from("-Doutput=");
        output_arg.push(output.as_os_str());

        let mut cmd = Command::new(&self.program);
        cmd.arg("-T10")
            .arg("help:effective-pom")
            .arg("-f")
            .arg(input)
            .arg(output_arg);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        info!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "expanding descriptor"
        );

        let mut child = cmd.spawn().map_err(|e| {
            PomwatchError::Expansion(format!("failed to spawn `{}`: {e}", self.program))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PomwatchError::Expansion("build tool stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PomwatchError::Expansion("build tool stderr not captured".into()))?;

        let (out_drained, err_drained) =
            tokio::join!(drain_lines(stdout, false), drain_lines(stderr, true));
        out_drained
            .and(err_drained)
            .map_err(|e| PomwatchError::Expansion(format!("error reading build tool output: {e}")))?;

        let status = child.wait().await.map_err(|e| {
            PomwatchError::Expansion(format!("failed waiting for `{}`: {e}", self.program))
        })?;
        // Killed-by-signal exits carry no code; fold them into a generic failure.
        let code = status.code().unwrap_or(-1);
        debug!(status = code, "build tool finished");
        Ok(code)
    }
}

fn named_xml_tempfile() -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .suffix(".xml")
        .tempfile()
        .map_err(|e| PomwatchError::Expansion(format!("cannot create work file: {e}")))
}

/// Read the expanded output. A missing file is tolerated only when the tool
/// already failed; it then stands for "no output produced".
fn read_output(path: &Path, status: i32) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && status != 0 => Ok(Vec::new()),
        Err(e) => Err(PomwatchError::io(path, e)),
    }
}

/// Forward tool output line by line: stdout at info, stderr at warn.
async fn drain_lines<R>(stream: R, is_stderr: bool) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if is_stderr {
            warn!("{line}");
        } else {
            info!("{line}");
        }
    }
    Ok(())
}
