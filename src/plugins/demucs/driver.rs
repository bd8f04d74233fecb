use crate::core::model::OutputFormat;
use crate::plugins::registry::{SeparationRun, SeparationTask, Separator, SeparatorExit};
use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Runs `python -m demucs.separate` as a child process. The child is killed
/// if the run is dropped before it exits.
pub struct DemucsSeparator;

impl DemucsSeparator {
    pub fn new() -> Self {
        Self
    }

    pub fn build_command(task: &SeparationTask) -> Command {
        let mut cmd = Command::new(&task.options.python);
        cmd.arg("-m").arg("demucs.separate");
        cmd.arg("-n").arg(&task.preset);
        cmd.arg("--out").arg(&task.output_dir);
        if matches!(task.format, OutputFormat::Mp3) {
            cmd.arg("--mp3");
        }
        if let Some(device) = &task.options.device {
            cmd.arg("-d").arg(device);
        }
        cmd.arg(&task.input_path);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Separator for DemucsSeparator {
    fn name(&self) -> &'static str {
        "demucs"
    }

    async fn start(&self, task: &SeparationTask) -> anyhow::Result<SeparationRun> {
        let mut child = Self::build_command(task)
            .spawn()
            .with_context(|| format!("spawn {} -m demucs.separate", task.options.python))?;

        let stderr = child.stderr.take().context("demucs stderr not captured")?;

        let finished = async move {
            let status = child.wait().await.context("wait for demucs")?;
            Ok(SeparatorExit { code: status.code() })
        }
        .boxed();

        Ok(SeparationRun {
            diagnostics: diagnostic_lines(stderr),
            finished,
        })
    }
}

/// Splits a diagnostic stream on `\n` and `\r`; progress bars redraw in place
/// with bare carriage returns, so each redraw becomes its own line.
pub fn diagnostic_lines<R>(reader: R) -> BoxStream<'static, std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    struct LineState<R> {
        reader: R,
        buf: BytesMut,
        eof: bool,
    }

    let init = LineState { reader, buf: BytesMut::with_capacity(4096), eof: false };

    futures::stream::unfold(init, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let chunk = st.buf.split_to(pos + 1);
                let line = String::from_utf8_lossy(&chunk[..pos]).into_owned();
                return Some((Ok(line), st));
            }

            if st.eof {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = st.buf.split();
                return Some((Ok(String::from_utf8_lossy(&rest).into_owned()), st));
            }

            match st.reader.read_buf(&mut st.buf).await {
                Ok(0) => st.eof = true,
                Ok(_) => {}
                Err(e) => {
                    st.eof = true;
                    st.buf.clear();
                    return Some((Err(e), st));
                }
            }
        }
    })
    .boxed()
}
