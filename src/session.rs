//! Capture session lifecycle.
//!
//! A [`CaptureSession`] records a [`RecordSurface`] through a
//! [`CaptureBackend`], compositing watermarks onto an off-screen target each
//! frame. The session is an explicit two-state machine: `Idle` holds nothing,
//! `Recording` holds every resource the cycle owns, so an illegal transition
//! is a matched-out error rather than a half-cleared struct.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use ab_glyph::FontArc;
use anyhow::Context as _;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::{
    capture::{CaptureBackend, Codec, StreamCapture, StreamConfig},
    compositor::{composite, overlay_draw_size},
    error::{VidstampError, VidstampResult},
    frame::FrameRgba,
    overlay::{load_overlay, PreparedOverlay},
    spec::WatermarkSpec,
    surface::RecordSurface,
    text::load_font,
};

/// How often accumulated encoder output is drained into the artifact buffer.
/// Independent of the frame interval.
const CHUNK_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct RecorderOptions {
    pub fps: u32,
    pub video_bits_per_second: u64,
    pub watermark: Option<WatermarkSpec>,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bits_per_second: 5_000_000,
            watermark: None,
        }
    }
}

/// Finalized output of one start/stop cycle.
#[derive(Clone, Debug)]
pub struct RecordingArtifact {
    pub data: Vec<u8>,
    pub codec: Codec,
    pub duration: Duration,
}

impl RecordingArtifact {
    pub fn suggested_file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.codec.extension())
    }

    pub fn write_to(&self, path: &Path) -> VidstampResult<()> {
        std::fs::write(path, &self.data)
            .with_context(|| format!("write recording to '{}'", path.display()))?;
        Ok(())
    }
}

enum SessionState {
    Idle,
    Recording {
        started_at: Instant,
        codec: Codec,
        stop_flag: Arc<AtomicBool>,
        resize_tx: Sender<(u32, u32)>,
        worker: thread::JoinHandle<VidstampResult<Vec<u8>>>,
    },
}

pub struct CaptureSession {
    surface: Arc<dyn RecordSurface>,
    backend: Box<dyn CaptureBackend>,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(surface: Arc<dyn RecordSurface>, backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            surface,
            backend,
            state: SessionState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording { .. })
    }

    /// Begin recording. Fails with `InvalidState` when already recording and
    /// with `CaptureUnavailable` when no preferred codec is supported; on any
    /// failure the session stays `Idle` with nothing allocated.
    pub fn start(&mut self, options: RecorderOptions) -> VidstampResult<()> {
        if self.is_recording() {
            return Err(VidstampError::invalid_state(
                "session is already recording; stop it before starting again",
            ));
        }
        if let Some(spec) = &options.watermark {
            spec.validate()?;
        }

        let codec = Codec::PREFERENCE
            .into_iter()
            .find(|c| self.backend.supports(*c))
            .ok_or_else(|| {
                VidstampError::capture_unavailable(
                    "capture backend supports none of the preferred encodings",
                )
            })?;

        // Watermark assets resolve before any stream exists; a failed image
        // load degrades to no image, it never blocks the start.
        let overlay = options
            .watermark
            .as_ref()
            .and_then(|spec| spec.image.as_ref())
            .and_then(|image| {
                let natural = load_overlay(&image.source)?;
                let (w, h) = overlay_draw_size(
                    natural.width,
                    natural.height,
                    image.width,
                    image.height,
                );
                Some(natural.scaled(w, h))
            });
        let font = match &options.watermark {
            Some(spec) if spec.wants_text() => {
                let font = load_font(spec.font.as_deref());
                if font.is_none() {
                    warn!("no usable font found, text watermarks will be skipped");
                }
                font
            }
            _ => None,
        };

        let (width, height) = self.surface.dimensions();
        let mut stream = self.backend.open(&StreamConfig {
            width,
            height,
            fps: options.fps,
            bits_per_second: options.video_bits_per_second,
            codec,
        })?;

        // Frame zero is composited and pushed here, before the loop thread
        // exists, so the stream has content even if stop() follows
        // immediately. A push failure drops the stream and leaves the
        // session idle.
        let mut source = FrameRgba::new(0, 0);
        let mut target = FrameRgba::new(0, 0);
        self.surface.read_into(&mut source);
        match &options.watermark {
            Some(spec) => {
                target.resize(source.width, source.height);
                composite(&source, &mut target, spec, overlay.as_ref(), font.as_ref());
                stream.push_frame(&target)?;
            }
            None => stream.push_frame(&source)?,
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (resize_tx, resize_rx) = crossbeam_channel::unbounded();
        let worker = {
            let surface = Arc::clone(&self.surface);
            let stop = Arc::clone(&stop_flag);
            let watermark = options.watermark.clone();
            let fps = options.fps;
            thread::Builder::new()
                .name("vidstamp-recorder".to_string())
                .spawn(move || {
                    recorder_loop(
                        surface, stream, source, target, watermark, overlay, font, fps, stop,
                        resize_rx,
                    )
                })
                .map_err(|e| VidstampError::worker(format!("failed to spawn recorder: {e}")))?
        };

        info!(?codec, width, height, fps = options.fps, "recording started");
        self.state = SessionState::Recording {
            started_at: Instant::now(),
            codec,
            stop_flag,
            resize_tx,
            worker,
        };
        Ok(())
    }

    /// Stop recording and assemble the artifact. Fails with `InvalidState`
    /// when no recording is active.
    pub fn stop(&mut self) -> VidstampResult<RecordingArtifact> {
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        let SessionState::Recording {
            started_at,
            codec,
            stop_flag,
            resize_tx,
            worker,
        } = state
        else {
            return Err(VidstampError::invalid_state("no active recording session"));
        };
        drop(resize_tx);

        // The loop observes the flag at its next tick and finalizes the
        // stream before returning, so joining here orders cancellation
        // before artifact assembly.
        stop_flag.store(true, Ordering::Relaxed);
        let data = worker
            .join()
            .map_err(|_| VidstampError::worker("recorder thread panicked"))??;
        let duration = started_at.elapsed();

        info!(bytes = data.len(), ?duration, "recording stopped");
        Ok(RecordingArtifact {
            data,
            codec,
            duration,
        })
    }

    /// Notify the session of a new capture size. The next scheduled frame
    /// composites into a target of these dimensions, with the source content
    /// blitted at the origin and clipped or padded as needed; nothing
    /// recomposites eagerly. A no-op while idle.
    pub fn update_surface_size(&mut self, width: u32, height: u32) {
        if let SessionState::Recording { resize_tx, .. } = &self.state {
            let _ = resize_tx.send((width, height));
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let SessionState::Recording {
            stop_flag, worker, ..
        } = std::mem::replace(&mut self.state, SessionState::Idle)
        {
            stop_flag.store(true, Ordering::Relaxed);
            let _ = worker.join();
        }
    }
}

/// The recorder loop: two independent deadlines, one for pushing composited
/// frames at the target rate and one for flushing encoder output roughly
/// every 100ms. Runs until the stop flag is observed, then drains and
/// finalizes the stream.
#[allow(clippy::too_many_arguments)]
fn recorder_loop(
    surface: Arc<dyn RecordSurface>,
    mut stream: Box<dyn StreamCapture>,
    mut source: FrameRgba,
    mut target: FrameRgba,
    watermark: Option<WatermarkSpec>,
    overlay: Option<PreparedOverlay>,
    font: Option<FontArc>,
    fps: u32,
    stop: Arc<AtomicBool>,
    resize_rx: Receiver<(u32, u32)>,
) -> VidstampResult<Vec<u8>> {
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let mut data = Vec::new();

    // Once notified, the explicit size wins over whatever the surface
    // reports; the source blit clips or pads accordingly.
    let mut notified_size: Option<(u32, u32)> = None;

    // Frame zero went out before this thread started.
    let mut next_frame = Instant::now() + frame_interval;
    let mut next_flush = Instant::now() + CHUNK_FLUSH_INTERVAL;

    while !stop.load(Ordering::Relaxed) {
        while let Ok(size) = resize_rx.try_recv() {
            debug!(width = size.0, height = size.1, "compositing target resized");
            notified_size = Some(size);
        }

        let now = Instant::now();
        if now >= next_frame {
            surface.read_into(&mut source);
            let (fw, fh) = notified_size.unwrap_or((source.width, source.height));
            match &watermark {
                Some(spec) => {
                    if (target.width, target.height) != (fw, fh) {
                        target.resize(fw, fh);
                    }
                    composite(&source, &mut target, spec, overlay.as_ref(), font.as_ref());
                    stream.push_frame(&target)?;
                }
                None if (fw, fh) == (source.width, source.height) => {
                    stream.push_frame(&source)?;
                }
                None => {
                    if (target.width, target.height) != (fw, fh) {
                        target.resize(fw, fh);
                    }
                    target.copy_from(&source);
                    stream.push_frame(&target)?;
                }
            }
            next_frame += frame_interval;
            if next_frame < now {
                // Fell behind; drop the missed ticks rather than bursting.
                next_frame = now + frame_interval;
            }
        }
        if now >= next_flush {
            while let Some(chunk) = stream.poll_chunk() {
                data.extend_from_slice(&chunk);
            }
            next_flush = now + CHUNK_FLUSH_INTERVAL;
        }

        let wake = next_frame.min(next_flush);
        if let Some(idle) = wake.checked_duration_since(Instant::now()) {
            thread::sleep(idle.min(Duration::from_millis(5)));
        }
    }

    while let Some(chunk) = stream.poll_chunk() {
        data.extend_from_slice(&chunk);
    }
    data.extend_from_slice(&stream.finish()?);
    Ok(data)
}
