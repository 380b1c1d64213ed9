use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::artifact::EnvironmentBindings;
use crate::errors::{ActionError, Phase};

// ---------------------------------------------------------------------------
// Process Invoker — one spawn → write → drain → wait cycle
//
// stdin is written while stdout/stderr are drained concurrently, so a child
// that prints before reading all of its input cannot wedge either side.
// Each stream is read to EOF; only the first `output_limit` bytes are kept.
// ---------------------------------------------------------------------------

const READ_CHUNK: usize = 8 * 1024;
const ETXTBSY: i32 = 26;
const SPAWN_RETRIES: u32 = 5;

/// One captured output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// The child wrote more than the retention limit.
    pub truncated: bool,
}

impl Captured {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Result of a completed invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Captured,
    pub stderr: Captured,
    pub elapsed: Duration,
}

impl Invocation {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: PathBuf,
    timeout: Option<Duration>,
    output_limit: usize,
}

impl ProcessInvoker {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>, output_limit: usize) -> Self {
        Self {
            program: program.into(),
            timeout,
            output_limit,
        }
    }

    /// Spawn the artifact with `argv`, feed it `stdin`, collect everything.
    ///
    /// A non-zero exit is data, not an error. Errors are reserved for the
    /// child never starting (`Spawn`), stream failures (`Io`) and the
    /// wall-clock limit (`Timeout`, after which the child is killed).
    pub async fn invoke(
        &self,
        phase: Phase,
        argv: &[&str],
        stdin: &[u8],
        env: &EnvironmentBindings,
    ) -> Result<Invocation, ActionError> {
        let started = Instant::now();
        let mut child = self.spawn(phase, argv, env).await?;

        let input = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.output_limit;

        let exchange = async {
            let (written, out, err) = tokio::join!(
                feed(input, stdin),
                drain(stdout, limit),
                drain(stderr, limit),
            );
            let status = child.wait().await;
            (written, out, err, status)
        };

        let (written, out, err, status) = match self.timeout {
            None => exchange.await,
            Some(wall) => match tokio::time::timeout(wall, exchange).await {
                Ok(done) => done,
                Err(_) => {
                    tracing::warn!(
                        program = %self.program.display(),
                        timeout_ms = wall.as_millis() as u64,
                        "action.invoke.timeout"
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(ActionError::Timeout {
                        timeout_ms: wall.as_millis() as u64,
                    });
                }
            },
        };

        if let Err(e) = written {
            // Child closed stdin early; its output still counts.
            tracing::debug!(error = %e, "action.invoke.stdin_closed");
        }
        let stdout = out.map_err(ActionError::Io)?;
        let stderr = err.map_err(ActionError::Io)?;
        let status = status.map_err(ActionError::Io)?;

        for (name, cap) in [("stdout", &stdout), ("stderr", &stderr)] {
            if cap.truncated {
                tracing::warn!(stream = name, limit, "action.invoke.output_truncated");
            }
        }

        Ok(Invocation {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }

    async fn spawn(
        &self,
        phase: Phase,
        argv: &[&str],
        env: &EnvironmentBindings,
    ) -> Result<Child, ActionError> {
        let mut attempt = 0;
        loop {
            let mut cmd = Command::new(&self.program);
            cmd.args(argv)
                .envs(env.iter())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            match cmd.spawn() {
                Ok(child) => return Ok(child),
                // A concurrent fork elsewhere may briefly hold the freshly
                // written artifact open for writing.
                Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                Err(source) => return Err(ActionError::Spawn { phase, source }),
            }
        }
    }
}

async fn feed<W>(input: Option<W>, payload: &[u8]) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let Some(mut w) = input else {
        return Ok(());
    };
    if !payload.is_empty() {
        w.write_all(payload).await?;
    }
    w.shutdown().await?;
    // dropping closes the pipe → child sees EOF
    Ok(())
}

async fn drain<R>(reader: Option<R>, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut r) = reader else {
        return Ok(captured);
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = r.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(room);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            captured.truncated = true;
        }
    }
    Ok(captured)
}
