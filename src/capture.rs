//! The underlying stream-capture boundary.
//!
//! A [`CaptureBackend`] turns frames pushed at a target rate into a live,
//! chunked container byte stream. The production backend pipes raw frames
//! through an `ffmpeg` child process; the in-memory backend gives tests a
//! deterministic stand-in.

use std::{
    collections::VecDeque,
    io::Read,
    process::{Child, ChildStdin, Command, Stdio},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    error::{VidstampError, VidstampResult},
    frame::FrameRgba,
};

/// Encodings a session may request, richest first in [`Codec::PREFERENCE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    Vp9,
    Vp8,
    /// Generic fallback: MPEG-4 part 2 in a Matroska container, available in
    /// effectively every ffmpeg build.
    Mpeg4,
}

impl Codec {
    /// Descending preference used for encoder selection.
    pub const PREFERENCE: [Codec; 3] = [Codec::Vp9, Codec::Vp8, Codec::Mpeg4];

    pub fn encoder(self) -> &'static str {
        match self {
            Codec::Vp9 => "libvpx-vp9",
            Codec::Vp8 => "libvpx",
            Codec::Mpeg4 => "mpeg4",
        }
    }

    pub fn container(self) -> &'static str {
        match self {
            Codec::Vp9 | Codec::Vp8 => "webm",
            Codec::Mpeg4 => "matroska",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Codec::Vp9 | Codec::Vp8 => "webm",
            Codec::Mpeg4 => "mkv",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Codec::Vp9 => "video/webm;codecs=vp9",
            Codec::Vp8 => "video/webm;codecs=vp8",
            Codec::Mpeg4 => "video/x-matroska",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bits_per_second: u64,
    pub codec: Codec,
}

impl StreamConfig {
    pub fn validate(&self) -> VidstampResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VidstampError::validation(
                "stream width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(VidstampError::validation("stream fps must be non-zero"));
        }
        Ok(())
    }
}

/// A live encoded stream: frames in, container byte chunks out.
pub trait StreamCapture: Send {
    /// Push one frame. Fixed-size encoders reject frames that do not match
    /// the dimensions the stream was opened with.
    fn push_frame(&mut self, frame: &FrameRgba) -> VidstampResult<()>;

    /// Newly available encoded bytes since the last poll, if any.
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;

    /// Finalize the container and return any remaining tail bytes.
    fn finish(self: Box<Self>) -> VidstampResult<Vec<u8>>;
}

/// Factory for capture streams; support is queried at call time.
pub trait CaptureBackend: Send {
    fn supports(&self, codec: Codec) -> bool;
    fn open(&self, cfg: &StreamConfig) -> VidstampResult<Box<dyn StreamCapture>>;
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Backend that encodes through an `ffmpeg` child process, reading raw RGBA
/// frames on stdin and emitting the muxed container on stdout.
#[derive(Default)]
pub struct FfmpegCaptureBackend {
    encoders: Mutex<Option<Arc<String>>>,
}

impl FfmpegCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder_list(&self) -> Arc<String> {
        let mut cached = self.encoders.lock();
        if let Some(list) = cached.as_ref() {
            return Arc::clone(list);
        }
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
            .unwrap_or_default();
        let list = Arc::new(output);
        *cached = Some(Arc::clone(&list));
        list
    }
}

impl CaptureBackend for FfmpegCaptureBackend {
    fn supports(&self, codec: Codec) -> bool {
        is_ffmpeg_on_path() && self.encoder_list().contains(codec.encoder())
    }

    fn open(&self, cfg: &StreamConfig) -> VidstampResult<Box<dyn StreamCapture>> {
        cfg.validate()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            cfg.codec.encoder(),
            "-b:v",
            &cfg.bits_per_second.to_string(),
        ]);
        if matches!(cfg.codec, Codec::Vp9 | Codec::Vp8) {
            // Live capture cannot afford the libvpx default two-pass-quality
            // deadlines.
            cmd.args(["-deadline", "realtime", "-cpu-used", "8"]);
        }
        cmd.args(["-f", cfg.codec.container(), "pipe:1"]);

        let mut child = cmd.spawn().map_err(|e| {
            VidstampError::capture_unavailable(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            VidstampError::capture_unavailable("failed to open ffmpeg stdin (unexpected)")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            VidstampError::capture_unavailable("failed to open ffmpeg stdout (unexpected)")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            VidstampError::capture_unavailable("failed to open ffmpeg stderr (unexpected)")
        })?;

        // Drain stdout as it is produced; the encoder stalls if the pipe
        // fills up.
        let (chunk_tx, chunk_rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) =
            crossbeam_channel::unbounded();
        let reader = thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = [0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if chunk_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_sink = Arc::clone(&stderr_buf);
        let stderr_reader = thread::spawn(move || {
            let mut stderr = stderr;
            let mut collected = Vec::new();
            let _ = stderr.read_to_end(&mut collected);
            *stderr_sink.lock() = collected;
        });

        debug!(codec = cfg.codec.encoder(), width = cfg.width, height = cfg.height, fps = cfg.fps, "ffmpeg capture stream opened");

        Ok(Box::new(FfmpegCapture {
            cfg: *cfg,
            child,
            stdin: Some(stdin),
            chunk_rx,
            reader: Some(reader),
            stderr_reader: Some(stderr_reader),
            stderr_buf,
        }))
    }
}

struct FfmpegCapture {
    cfg: StreamConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    chunk_rx: Receiver<Vec<u8>>,
    reader: Option<thread::JoinHandle<()>>,
    stderr_reader: Option<thread::JoinHandle<()>>,
    stderr_buf: Arc<Mutex<Vec<u8>>>,
}

impl FfmpegCapture {
    fn stderr_snippet(&self) -> String {
        String::from_utf8_lossy(&self.stderr_buf.lock())
            .trim()
            .to_string()
    }
}

impl StreamCapture for FfmpegCapture {
    fn push_frame(&mut self, frame: &FrameRgba) -> VidstampResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(VidstampError::validation(format!(
                "frame size mismatch: got {}x{}, stream expects {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VidstampError::invalid_state(
                "capture stream is already finalized",
            ));
        };

        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            VidstampError::capture_unavailable(format!(
                "failed to write frame to ffmpeg: {e}: {}",
                self.stderr_snippet()
            ))
        })
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        match self.chunk_rx.try_recv() {
            Ok(chunk) => Some(chunk),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    fn finish(mut self: Box<Self>) -> VidstampResult<Vec<u8>> {
        // Closing stdin signals EOF; ffmpeg flushes the container and exits.
        drop(self.stdin.take());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(stderr_reader) = self.stderr_reader.take() {
            let _ = stderr_reader.join();
        }

        let mut tail = Vec::new();
        while let Ok(chunk) = self.chunk_rx.try_recv() {
            tail.extend_from_slice(&chunk);
        }

        let status = self
            .child
            .wait()
            .map_err(|e| VidstampError::capture_unavailable(format!("ffmpeg wait failed: {e}")))?;
        if !status.success() {
            return Err(VidstampError::capture_unavailable(format!(
                "ffmpeg exited with status {status}: {}",
                self.stderr_snippet()
            )));
        }
        Ok(tail)
    }
}

/// Observable state of a [`MemoryCaptureBackend`] stream, shared with tests.
#[derive(Debug, Default)]
pub struct MemoryCaptureState {
    pub frames_pushed: u64,
    pub frame_sizes: Vec<(u32, u32)>,
    pub last_frame: Option<FrameRgba>,
    pub finished: bool,
    pub codec: Option<Codec>,
    pending: VecDeque<Vec<u8>>,
}

/// Deterministic in-process backend: accepts every codec and any frame size
/// and emits one compact synthetic packet per pushed frame.
#[derive(Clone, Default)]
pub struct MemoryCaptureBackend {
    state: Arc<Mutex<MemoryCaptureState>>,
}

impl MemoryCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the stream state, valid across open/finish cycles.
    pub fn state(&self) -> Arc<Mutex<MemoryCaptureState>> {
        Arc::clone(&self.state)
    }
}

impl CaptureBackend for MemoryCaptureBackend {
    fn supports(&self, _codec: Codec) -> bool {
        true
    }

    fn open(&self, cfg: &StreamConfig) -> VidstampResult<Box<dyn StreamCapture>> {
        cfg.validate()?;
        let mut state = self.state.lock();
        *state = MemoryCaptureState {
            codec: Some(cfg.codec),
            ..MemoryCaptureState::default()
        };
        Ok(Box::new(MemoryCapture {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryCapture {
    state: Arc<Mutex<MemoryCaptureState>>,
}

impl StreamCapture for MemoryCapture {
    fn push_frame(&mut self, frame: &FrameRgba) -> VidstampResult<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(VidstampError::invalid_state(
                "capture stream is already finalized",
            ));
        }

        let index = state.frames_pushed;
        state.frames_pushed += 1;
        if state.frame_sizes.last() != Some(&(frame.width, frame.height)) {
            state.frame_sizes.push((frame.width, frame.height));
        }
        state.last_frame = Some(frame.clone());

        // 24-byte synthetic packet: magic, index, dimensions, pixel digest.
        let mut packet = Vec::with_capacity(24);
        packet.extend_from_slice(b"VSMC");
        packet.extend_from_slice(&(index as u32).to_le_bytes());
        packet.extend_from_slice(&frame.width.to_le_bytes());
        packet.extend_from_slice(&frame.height.to_le_bytes());
        packet.extend_from_slice(&fnv1a64(&frame.data).to_le_bytes());
        state.pending.push_back(packet);
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        self.state.lock().pending.pop_front()
    }

    fn finish(self: Box<Self>) -> VidstampResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.finished = true;
        let mut tail = Vec::new();
        while let Some(chunk) = state.pending.pop_front() {
            tail.extend_from_slice(&chunk);
        }
        Ok(tail)
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}
