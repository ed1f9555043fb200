//! Worker-isolated transcoding.
//!
//! [`TranscodeClient`] converts a captured container into MP4 (H.264) on a
//! dedicated worker thread, talking to it purely over channels. The worker
//! is created lazily on first use and reused until [`TranscodeClient::terminate`]
//! tears it down; the next call after a terminate starts a fresh one.

use std::{
    io::{BufRead, BufReader, Read},
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::Context as _;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::debug;

use crate::{
    capture::is_ffmpeg_on_path,
    error::{VidstampError, VidstampResult},
};

/// Progress event for an in-flight conversion. Percentages are derived from
/// elapsed processing time and are approximate.
#[derive(Clone, Debug)]
pub struct ConversionProgress {
    pub percent: f32,
    pub message: String,
}

enum WorkerRequest {
    Probe {
        reply: Sender<VidstampResult<()>>,
    },
    Convert {
        input: Vec<u8>,
        expected_duration: Option<Duration>,
        progress: Sender<ConversionProgress>,
        reply: Sender<VidstampResult<Vec<u8>>>,
    },
}

struct WorkerHandle {
    tx: Sender<WorkerRequest>,
    thread: thread::JoinHandle<()>,
}

/// Client façade over the transcode worker thread.
///
/// Calls take `&mut self`, so conversions on one client are serialized by
/// construction; the per-call reply channel carries exactly one terminal
/// message.
#[derive(Default)]
pub struct TranscodeClient {
    worker: Option<WorkerHandle>,
}

impl TranscodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn worker_handle(&mut self) -> VidstampResult<&WorkerHandle> {
        if self.worker.is_none() {
            let (tx, rx) = unbounded();
            let thread = thread::Builder::new()
                .name("vidstamp-transcode".to_string())
                .spawn(move || worker_loop(rx))
                .map_err(|e| {
                    VidstampError::worker(format!("failed to spawn transcode worker: {e}"))
                })?;
            self.worker = Some(WorkerHandle { tx, thread });
        }
        match &self.worker {
            Some(handle) => Ok(handle),
            None => Err(VidstampError::worker("transcode worker unavailable")),
        }
    }

    /// Verify the codec engine is usable, creating the worker if needed.
    ///
    /// Unlike [`TranscodeClient::convert`] this takes no progress callback:
    /// the engine is a local ffmpeg binary, so readiness is a single cheap
    /// probe with no intermediate progress to report.
    pub fn load(&mut self) -> VidstampResult<()> {
        let worker = self.worker_handle()?;
        let (reply_tx, reply_rx) = bounded(1);
        worker
            .tx
            .send(WorkerRequest::Probe { reply: reply_tx })
            .map_err(|_| VidstampError::worker("transcode worker hung up"))?;
        reply_rx
            .recv()
            .map_err(|_| VidstampError::worker("transcode worker hung up"))?
    }

    /// Convert captured container bytes to MP4, blocking until done.
    ///
    /// `expected_duration` is the media length when the caller knows it;
    /// progress percentages are exact against it and a capped extrapolation
    /// without it. An engine failure fails this call only, the worker stays
    /// reusable.
    pub fn convert(
        &mut self,
        input: &[u8],
        expected_duration: Option<Duration>,
        mut on_progress: Option<&mut dyn FnMut(ConversionProgress)>,
    ) -> VidstampResult<Vec<u8>> {
        let worker = self.worker_handle()?;
        let (progress_tx, progress_rx) = unbounded();
        let (reply_tx, reply_rx) = bounded(1);
        worker
            .tx
            .send(WorkerRequest::Convert {
                input: input.to_vec(),
                expected_duration,
                progress: progress_tx,
                reply: reply_tx,
            })
            .map_err(|_| VidstampError::worker("transcode worker hung up"))?;

        loop {
            crossbeam_channel::select! {
                recv(progress_rx) -> event => match event {
                    Ok(event) => {
                        if let Some(cb) = on_progress.as_mut() {
                            cb(event);
                        }
                    }
                    // Progress side closed; only the terminal reply remains.
                    Err(_) => {
                        return reply_rx
                            .recv()
                            .map_err(|_| VidstampError::worker("transcode worker hung up"))?;
                    }
                },
                recv(reply_rx) -> result => {
                    return result
                        .map_err(|_| VidstampError::worker("transcode worker hung up"))?;
                }
            }
        }
    }

    /// Tear down the worker. Subsequent calls create a fresh one.
    pub fn terminate(&mut self) {
        if let Some(WorkerHandle { tx, thread }) = self.worker.take() {
            drop(tx);
            let _ = thread.join();
        }
    }
}

impl Drop for TranscodeClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(rx: Receiver<WorkerRequest>) {
    while let Ok(request) = rx.recv() {
        match request {
            WorkerRequest::Probe { reply } => {
                let _ = reply.send(probe_engine());
            }
            WorkerRequest::Convert {
                input,
                expected_duration,
                progress,
                reply,
            } => {
                let result = run_convert(&input, expected_duration, &progress);
                let _ = reply.send(result);
            }
        }
    }
}

fn probe_engine() -> VidstampResult<()> {
    if !is_ffmpeg_on_path() {
        return Err(VidstampError::worker("ffmpeg not found on PATH"));
    }
    let encoders = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default();
    if !encoders.contains("libx264") {
        return Err(VidstampError::worker(
            "ffmpeg build lacks the libx264 encoder",
        ));
    }
    Ok(())
}

fn run_convert(
    input: &[u8],
    expected_duration: Option<Duration>,
    progress: &Sender<ConversionProgress>,
) -> VidstampResult<Vec<u8>> {
    let dir = tempfile::tempdir().context("create transcode scratch directory")?;
    let in_path = dir.path().join("input.bin");
    let out_path = dir.path().join("output.mp4");
    std::fs::write(&in_path, input).context("write transcode input")?;

    let mut child = Command::new("ffmpeg")
        .args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
            "-i",
        ])
        .arg(&in_path)
        .args([
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&out_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VidstampError::worker(format!("failed to spawn ffmpeg: {e}")))?;

    let stderr_collector = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut collected = Vec::new();
            let _ = stderr.read_to_end(&mut collected);
            collected
        })
    });

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Some(elapsed) = parse_out_time(&line) {
                let _ = progress.send(ConversionProgress {
                    percent: progress_percent(elapsed, expected_duration),
                    message: format!("transcoded {:.1}s", elapsed.as_secs_f64()),
                });
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| VidstampError::worker(format!("ffmpeg wait failed: {e}")))?;
    let stderr = stderr_collector
        .and_then(|t| t.join().ok())
        .unwrap_or_default();
    if !status.success() {
        return Err(VidstampError::worker(format!(
            "ffmpeg exited with status {status}: {}",
            String::from_utf8_lossy(&stderr).trim()
        )));
    }

    let output = std::fs::read(&out_path).context("read transcode output")?;
    debug!(input_bytes = input.len(), output_bytes = output.len(), "conversion finished");
    Ok(output)
}

/// Processing position from one `-progress` key/value line. Both keys carry
/// microseconds; `out_time_ms` is misnamed upstream.
fn parse_out_time(line: &str) -> Option<Duration> {
    let micros = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))?;
    let micros: u64 = micros.trim().parse().ok()?;
    Some(Duration::from_micros(micros))
}

/// Percentage from elapsed processing time. Exact (capped at 100) against a
/// known total; otherwise an asymptotic estimate that never reports done.
pub fn progress_percent(elapsed: Duration, expected: Option<Duration>) -> f32 {
    match expected {
        Some(total) if total > Duration::ZERO => {
            (elapsed.as_secs_f32() / total.as_secs_f32() * 100.0).min(100.0)
        }
        _ => {
            let t = elapsed.as_secs_f32();
            (t / (t + 10.0) * 100.0).min(99.0)
        }
    }
}
