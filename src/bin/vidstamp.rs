use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use vidstamp::{
    CaptureSession, FfmpegCaptureBackend, PixelSurface, RecordSurface, RecorderOptions,
    TranscodeClient, WatermarkSpec,
};

#[derive(Parser, Debug)]
#[command(name = "vidstamp", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a demo animation to a video file (requires `ffmpeg` on PATH).
    Record(RecordArgs),
    /// Convert a recorded container to MP4 (requires `ffmpeg` with libx264).
    Convert(ConvertArgs),
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Recording length in seconds.
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Surface width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Target frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Video bitrate in bits per second.
    #[arg(long, default_value_t = 5_000_000)]
    bitrate: u64,

    /// Watermark configuration JSON.
    #[arg(long)]
    watermark: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input container path (webm/mkv).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Media length in milliseconds, for exact progress percentages.
    #[arg(long)]
    duration_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Record(args) => cmd_record(args),
        Command::Convert(args) => cmd_convert(args),
    }
}

fn read_watermark_json(path: &Path) -> anyhow::Result<WatermarkSpec> {
    let f = File::open(path).with_context(|| format!("open watermark '{}'", path.display()))?;
    let spec: WatermarkSpec =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse watermark JSON")?;
    Ok(spec)
}

fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let watermark = args
        .watermark
        .as_deref()
        .map(read_watermark_json)
        .transpose()?;

    let surface = Arc::new(PixelSurface::new(args.width, args.height));
    let mut session = CaptureSession::new(
        Arc::clone(&surface) as Arc<dyn RecordSurface>,
        Box::new(FfmpegCaptureBackend::new()),
    );
    session.start(RecorderOptions {
        fps: args.fps,
        video_bits_per_second: args.bitrate,
        watermark,
    })?;

    // Bouncing block over a flat background, redrawn at the target rate
    // while the session records concurrently.
    let side = 80u32;
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds.max(0.0));
    let tick = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let (mut x, mut y) = (20i32, 20i32);
    let (mut dx, mut dy) = (4i32, 3i32);
    while Instant::now() < deadline {
        surface.draw(|frame| {
            frame.fill_rect(0, 0, frame.width, frame.height, [18, 20, 28, 255]);
            frame.fill_rect(x, y, side, side, [240, 90, 40, 255]);
        });
        x += dx;
        y += dy;
        if x <= 0 || x + side as i32 >= args.width as i32 {
            dx = -dx;
        }
        if y <= 0 || y + side as i32 >= args.height as i32 {
            dy = -dy;
        }
        thread::sleep(tick);
    }

    let artifact = session.stop()?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    artifact.write_to(&args.out)?;

    eprintln!(
        "wrote {} ({} bytes, {:.1}s, {:?})",
        args.out.display(),
        artifact.data.len(),
        artifact.duration.as_secs_f64(),
        artifact.codec,
    );
    Ok(())
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let input = std::fs::read(&args.in_path)
        .with_context(|| format!("read input '{}'", args.in_path.display()))?;

    let mut client = TranscodeClient::new();
    client.load()?;
    let expected = args.duration_ms.map(Duration::from_millis);
    let output = client.convert(
        &input,
        expected,
        Some(&mut |p| eprintln!("{:5.1}% {}", p.percent, p.message)),
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &output)
        .with_context(|| format!("write output '{}'", args.out.display()))?;

    eprintln!("wrote {} ({} bytes)", args.out.display(), output.len());
    Ok(())
}
