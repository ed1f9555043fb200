#![forbid(unsafe_code)]

pub mod capture;
pub mod color;
pub mod compositor;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod position;
pub mod session;
pub mod spec;
pub mod surface;
pub mod text;
pub mod transcode;

pub use capture::{CaptureBackend, Codec, FfmpegCaptureBackend, MemoryCaptureBackend, StreamCapture, StreamConfig};
pub use color::Color;
pub use compositor::composite;
pub use error::{VidstampError, VidstampResult};
pub use frame::FrameRgba;
pub use overlay::{load_overlay, OverlaySource, PreparedOverlay};
pub use session::{CaptureSession, RecorderOptions, RecordingArtifact};
pub use spec::{BarEdge, BarSpec, Corner, ImageWatermark, Position, TextAlign, TextWatermark, ThicknessUnit, WatermarkSpec};
pub use surface::{PixelSurface, RecordSurface};
pub use transcode::{ConversionProgress, TranscodeClient};
