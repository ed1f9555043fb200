//! End-to-end session lifecycle against the in-memory capture backend.

use std::{sync::Arc, thread, time::Duration};

use vidstamp::{
    capture::{CaptureBackend, Codec, MemoryCaptureBackend, StreamCapture, StreamConfig},
    spec::{BarEdge, BarSpec, Corner, ImageWatermark, Position, TextWatermark},
    CaptureSession, Color, OverlaySource, PixelSurface, RecordSurface, RecorderOptions,
    VidstampError, VidstampResult, WatermarkSpec,
};

fn new_session(
    width: u32,
    height: u32,
) -> (Arc<PixelSurface>, MemoryCaptureBackend, CaptureSession) {
    let surface = Arc::new(PixelSurface::new(width, height));
    let backend = MemoryCaptureBackend::new();
    let session = CaptureSession::new(
        Arc::clone(&surface) as Arc<dyn RecordSurface>,
        Box::new(backend.clone()),
    );
    (surface, backend, session)
}

fn text_watermark() -> WatermarkSpec {
    WatermarkSpec {
        text: Some(TextWatermark {
            text: "vidstamp demo".to_string(),
            position: Position::Corner(Corner::BottomRight),
            font_size: 24.0,
            color: Color::white(),
            padding: 10.0,
        }),
        ..WatermarkSpec::default()
    }
}

#[test]
fn records_for_roughly_the_requested_time() {
    let (surface, backend, mut session) = new_session(640, 480);
    session
        .start(RecorderOptions {
            fps: 30,
            watermark: Some(text_watermark()),
            ..RecorderOptions::default()
        })
        .unwrap();
    assert!(session.is_recording());

    for i in 0..10 {
        surface.draw(|f| f.fill_rect(i * 8, 0, 8, 8, [255, 0, 0, 255]));
        thread::sleep(Duration::from_millis(100));
    }

    let artifact = session.stop().unwrap();
    assert!(!session.is_recording());
    assert!(!artifact.data.is_empty());
    assert_eq!(artifact.codec, Codec::Vp9);
    assert!(artifact.duration >= Duration::from_millis(900));
    assert!(artifact.duration < Duration::from_millis(2500));

    let state = backend.state();
    let state = state.lock();
    assert!(state.finished);
    // Roughly one frame per tick over the second; allow wide timer slack.
    assert!(state.frames_pushed >= 15, "got {}", state.frames_pushed);
}

#[test]
fn double_start_is_an_error_and_keeps_one_stream() {
    let (_surface, backend, mut session) = new_session(64, 64);
    session.start(RecorderOptions::default()).unwrap();
    let err = session.start(RecorderOptions::default()).unwrap_err();
    assert!(matches!(err, VidstampError::InvalidState(_)));

    // The first recording is unaffected by the rejected start.
    thread::sleep(Duration::from_millis(150));
    session.stop().unwrap();
    assert!(backend.state().lock().frames_pushed > 0);
}

#[test]
fn stop_without_start_mutates_nothing() {
    let (_surface, backend, mut session) = new_session(64, 64);
    let err = session.stop().unwrap_err();
    assert!(matches!(err, VidstampError::InvalidState(_)));

    let state = backend.state();
    let state = state.lock();
    assert_eq!(state.frames_pushed, 0);
    assert!(!state.finished);
}

#[test]
fn unreachable_watermark_image_degrades_to_no_image() {
    let (_surface, backend, mut session) = new_session(64, 64);
    let spec = WatermarkSpec {
        image: Some(ImageWatermark {
            source: OverlaySource::Remote("http://127.0.0.1:1/logo.png".to_string()),
            position: Position::Corner(Corner::TopLeft),
            width: None,
            height: None,
            opacity: 1.0,
            padding: 10.0,
        }),
        ..WatermarkSpec::default()
    };

    session
        .start(RecorderOptions {
            watermark: Some(spec),
            ..RecorderOptions::default()
        })
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    let artifact = session.stop().unwrap();

    assert!(!artifact.data.is_empty());
    assert!(backend.state().lock().frames_pushed > 0);
}

#[test]
fn invalid_watermark_rejects_before_any_stream_opens() {
    let (_surface, backend, mut session) = new_session(64, 64);
    let mut spec = WatermarkSpec::default();
    spec.image = Some(ImageWatermark {
        source: OverlaySource::Raster {
            width: 1,
            height: 1,
            rgba8: vec![0; 4],
        },
        position: Position::Corner(Corner::TopLeft),
        width: None,
        height: None,
        opacity: 2.0,
        padding: 0.0,
    });

    let err = session
        .start(RecorderOptions {
            watermark: Some(spec),
            ..RecorderOptions::default()
        })
        .unwrap_err();
    assert!(matches!(err, VidstampError::Validation(_)));
    assert!(!session.is_recording());
    assert_eq!(backend.state().lock().frames_pushed, 0);
}

#[test]
fn first_frame_is_captured_before_start_returns() {
    let (_surface, backend, mut session) = new_session(64, 64);
    session
        .start(RecorderOptions {
            watermark: Some(text_watermark()),
            ..RecorderOptions::default()
        })
        .unwrap();

    // No sleep: frame zero goes out synchronously during start(), so even an
    // immediate stop yields a non-empty artifact.
    let artifact = session.stop().unwrap();
    assert!(!artifact.data.is_empty());
    assert!(backend.state().lock().frames_pushed >= 1);
}

/// Counts WARN events on the current thread; lets tests assert a degraded
/// path logged exactly once.
#[derive(Default)]
struct WarnCounter {
    warns: std::sync::atomic::AtomicUsize,
}

impl tracing::Subscriber for WarnCounter {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        *metadata.level() <= tracing::Level::WARN
    }
    fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }
    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
    fn event(&self, event: &tracing::Event<'_>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.warns
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
    fn enter(&self, _: &tracing::span::Id) {}
    fn exit(&self, _: &tracing::span::Id) {}
}

#[test]
fn missing_font_warns_once_and_recording_proceeds() {
    if vidstamp::text::load_font(None).is_some() {
        eprintln!("skipping: a system font is available");
        return;
    }

    let counter = Arc::new(WarnCounter::default());
    let warns = Arc::clone(&counter);
    tracing::subscriber::with_default(counter, || {
        let (_surface, backend, mut session) = new_session(64, 64);
        session
            .start(RecorderOptions {
                watermark: Some(text_watermark()),
                ..RecorderOptions::default()
            })
            .unwrap();
        let artifact = session.stop().unwrap();
        assert!(!artifact.data.is_empty());
        assert!(backend.state().lock().frames_pushed >= 1);
    });
    assert_eq!(warns.warns.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[test]
fn update_surface_size_alone_changes_captured_dimensions() {
    let (_surface, backend, mut session) = new_session(64, 64);
    session.start(RecorderOptions::default()).unwrap();
    thread::sleep(Duration::from_millis(200));

    // The notified size takes effect even when the surface itself never
    // resizes; the source blit clips into the smaller target.
    session.update_surface_size(32, 16);
    thread::sleep(Duration::from_millis(200));

    session.stop().unwrap();
    let state = backend.state();
    let sizes = state.lock().frame_sizes.clone();
    assert!(sizes.contains(&(64, 64)));
    assert!(sizes.contains(&(32, 16)));
}

#[test]
fn resize_mid_recording_switches_frame_dimensions() {
    let (surface, backend, mut session) = new_session(64, 64);
    session.start(RecorderOptions::default()).unwrap();
    thread::sleep(Duration::from_millis(200));

    surface.resize(128, 32);
    session.update_surface_size(128, 32);
    thread::sleep(Duration::from_millis(200));

    session.stop().unwrap();
    let state = backend.state();
    let sizes = state.lock().frame_sizes.clone();
    assert!(sizes.contains(&(64, 64)));
    assert!(sizes.contains(&(128, 32)));
}

#[test]
fn bars_reach_the_captured_frames() {
    let (_surface, backend, mut session) = new_session(100, 100);
    let spec = WatermarkSpec {
        bars: vec![BarSpec {
            edge: BarEdge::Top,
            thickness: 10.0,
            color: Color::parse("#ff0000").unwrap(),
            ..BarSpec::default()
        }],
        ..WatermarkSpec::default()
    };
    session
        .start(RecorderOptions {
            watermark: Some(spec),
            ..RecorderOptions::default()
        })
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    session.stop().unwrap();

    let state = backend.state();
    let state = state.lock();
    let frame = state.last_frame.as_ref().expect("captured at least one frame");
    // Top-left pixel sits inside the bar; surface background is opaque black.
    assert_eq!(&frame.data[0..4], &[255, 0, 0, 255]);
}

/// Backend that claims support but refuses to open, for start-failure paths.
struct RefusingBackend;

impl CaptureBackend for RefusingBackend {
    fn supports(&self, _codec: Codec) -> bool {
        false
    }

    fn open(&self, _cfg: &StreamConfig) -> VidstampResult<Box<dyn StreamCapture>> {
        Err(VidstampError::capture_unavailable("refused"))
    }
}

#[test]
fn unsupported_backend_fails_start_and_stays_idle() {
    let surface = Arc::new(PixelSurface::new(64, 64));
    let mut session = CaptureSession::new(surface, Box::new(RefusingBackend));

    let err = session.start(RecorderOptions::default()).unwrap_err();
    assert!(matches!(err, VidstampError::CaptureUnavailable(_)));
    assert!(!session.is_recording());

    // A later stop still reports no active session, not a half-open one.
    assert!(matches!(
        session.stop().unwrap_err(),
        VidstampError::InvalidState(_)
    ));
}
