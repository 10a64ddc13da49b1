//! FFmpeg discovery and the ffmpeg-backed encoder.
//!
//! Every container other than WAV is produced by an ffmpeg child process.
//! Raw frames go in on stdin (and, for camera recordings on Unix, the
//! microphone through a named pipe), the muxed container comes back on
//! stdout and is sliced into chunks on the timeslice cadence.

use super::encoder::{EncoderCommand, EncoderHandle, EventSink};
use super::format::{Container, MediaFormat};
use crate::capture::{AudioSettings, LiveStream, MediaFrame, MediaKind, VideoSettings};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Locates the ffmpeg binary on the system.
///
/// Checks in this order:
/// 1. macOS homebrew locations: `/opt/homebrew/bin/ffmpeg`, `/usr/local/bin/ffmpeg`
/// 2. Linux standard locations: `/usr/bin/ffmpeg`, `/usr/local/bin/ffmpeg`
/// 3. Windows standard locations: `C:\ffmpeg\bin\ffmpeg.exe`
/// 4. Falls back to PATH search via `which` or `where` command
///
/// # Returns
/// The path to the ffmpeg binary, or an error if not found.
pub fn find_ffmpeg() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        tracing::debug!("Found ffmpeg at: {}", path.display());
        return Ok(path);
    }

    let ffmpeg_path = find_in_path("ffmpeg")?;
    tracing::debug!("Found ffmpeg in PATH at: {}", ffmpeg_path.display());
    Ok(ffmpeg_path)
}

/// Searches for a binary in the system PATH.
fn find_in_path(binary_name: &str) -> Result<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = std::process::Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for {binary_name}: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.lines().next().unwrap_or("").trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(anyhow!(
        "ffmpeg not found. Install it to record formats other than WAV and to use the camera:\n\
         macOS: brew install ffmpeg\n\
         Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)"
    ))
}

/// Names of the encoders the given ffmpeg build provides.
pub fn list_encoders(ffmpeg: &Path) -> Result<Vec<String>> {
    let output = std::process::Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {}", ffmpeg.display()))?;

    if !output.status.success() {
        return Err(anyhow!("ffmpeg -encoders exited with {}", output.status));
    }
    Ok(parse_encoders(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the table printed by `ffmpeg -encoders`.
fn parse_encoders(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// ffmpeg encoders used to produce a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPlan {
    pub video: Option<&'static str>,
    pub audio: &'static str,
}

fn video_encoder(codec: &str) -> Option<&'static str> {
    match codec {
        "vp9" | "vp09" => Some("libvpx-vp9"),
        "vp8" => Some("libvpx"),
        "h264" | "avc1" => Some("libx264"),
        "av1" | "av01" => Some("libaom-av1"),
        _ if codec.starts_with("avc1.") => Some("libx264"),
        _ if codec.starts_with("vp09.") => Some("libvpx-vp9"),
        _ => None,
    }
}

fn audio_encoder(codec: &str) -> Option<&'static str> {
    match codec {
        "opus" => Some("libopus"),
        "vorbis" => Some("libvorbis"),
        "aac" | "mp4a" => Some("aac"),
        _ if codec.starts_with("mp4a.") => Some("aac"),
        _ => None,
    }
}

/// Chooses encoders for a format, honouring its `codecs` parameter.
///
/// Returns `None` for WAV (native) and for codec/container combinations
/// ffmpeg is not asked to produce.
pub fn codec_plan(format: &MediaFormat) -> Option<CodecPlan> {
    let defaults = match (format.kind(), format.container()) {
        (_, Container::Wav) => return None,
        (MediaKind::Audio, Container::Mp4) => CodecPlan {
            video: None,
            audio: "aac",
        },
        (MediaKind::Audio, _) => CodecPlan {
            video: None,
            audio: "libopus",
        },
        (MediaKind::Video, Container::Webm) => CodecPlan {
            video: Some("libvpx"),
            audio: "libopus",
        },
        (MediaKind::Video, Container::Mp4) => CodecPlan {
            video: Some("libx264"),
            audio: "aac",
        },
        (MediaKind::Video, Container::Matroska) => CodecPlan {
            video: Some("libx264"),
            audio: "libopus",
        },
        (MediaKind::Video, Container::Ogg) => return None,
    };

    let Some(codecs) = format.codecs() else {
        return Some(defaults);
    };

    let mut plan = defaults;
    for codec in codecs.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(encoder) = video_encoder(codec) {
            if format.kind() == MediaKind::Audio {
                return None;
            }
            plan.video = Some(encoder);
        } else if let Some(encoder) = audio_encoder(codec) {
            plan.audio = encoder;
        } else {
            return None;
        }
    }
    Some(plan)
}

fn video_input_args(settings: VideoSettings) -> Vec<String> {
    vec![
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", settings.width, settings.height),
        "-r".into(),
        settings.frame_rate.to_string(),
    ]
}

fn audio_input_args(settings: AudioSettings) -> Vec<String> {
    vec![
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        settings.sample_rate.to_string(),
        "-ac".into(),
        settings.channels.to_string(),
    ]
}

fn output_args(plan: CodecPlan, format: &MediaFormat, with_audio: bool) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(video) = plan.video {
        args.extend(["-c:v".into(), video.to_string(), "-pix_fmt".into(), "yuv420p".into()]);
        match video {
            "libvpx" | "libvpx-vp9" => args.extend([
                "-deadline".into(),
                "realtime".into(),
                "-cpu-used".into(),
                "8".into(),
                "-b:v".into(),
                "1M".into(),
            ]),
            "libx264" => args.extend([
                "-preset".into(),
                "veryfast".into(),
                "-tune".into(),
                "zerolatency".into(),
            ]),
            _ => {}
        }
    }

    if with_audio {
        args.extend(["-c:a".into(), plan.audio.to_string()]);
    } else {
        args.push("-an".into());
    }

    // Output goes to a pipe, so mp4 must be fragmented.
    if format.container() == Container::Mp4 {
        args.extend(["-movflags".into(), "frag_keyframe+empty_moov+default_base_moof".into()]);
    }

    args.extend([
        "-f".into(),
        format.container().muxer().to_string(),
        "pipe:1".into(),
    ]);
    args
}

/// Named pipe carrying microphone samples next to the video on stdin.
#[cfg(unix)]
struct FifoInput {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

#[cfg(unix)]
impl FifoInput {
    fn create() -> Result<Self> {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::Builder::new()
            .prefix("tapedeck-")
            .tempdir()
            .context("Failed to create pipe directory")?;
        let path = dir.path().join("audio.pcm");
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())?;

        // SAFETY: c_path is a valid NUL-terminated path for the duration of the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error()).context("mkfifo failed");
        }
        Ok(Self { _dir: dir, path })
    }

    /// Feeds `rx` into the pipe once ffmpeg has opened it for reading.
    fn spawn_writer(&self, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
        let path = self.path.clone();
        tokio::spawn(async move {
            let opened = tokio::task::spawn_blocking(move || {
                std::fs::OpenOptions::new().write(true).open(path)
            })
            .await;
            match opened {
                Ok(Ok(file)) => feed(tokio::fs::File::from_std(file), rx).await,
                Ok(Err(e)) => tracing::warn!("Failed to open audio pipe: {}", e),
                Err(e) => tracing::warn!("Audio pipe task failed: {}", e),
            }
        })
    }

    /// Releases a writer still blocked in `open` after ffmpeg went away.
    fn unblock(&self) {
        use std::os::unix::fs::OpenOptionsExt;

        let _ = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path);
    }
}

#[cfg(not(unix))]
struct FifoInput;

#[cfg(not(unix))]
impl FifoInput {
    fn spawn_writer(&self, _rx: mpsc::UnboundedReceiver<Vec<u8>>) {}

    fn unblock(&self) {}
}

/// Adds the microphone input for a camera recording.
#[cfg(unix)]
fn open_audio_pipe(cmd: &mut Command, audio: AudioSettings) -> Result<Option<FifoInput>> {
    let pipe = FifoInput::create()?;
    cmd.args(audio_input_args(audio)).arg("-i").arg(&pipe.path);
    Ok(Some(pipe))
}

#[cfg(not(unix))]
fn open_audio_pipe(_cmd: &mut Command, _audio: AudioSettings) -> Result<Option<FifoInput>> {
    tracing::warn!("Camera recordings are saved without sound on this platform");
    Ok(None)
}

/// Writes every buffer from `rx` to `writer` until the channel closes.
async fn feed<W, T>(mut writer: W, mut rx: mpsc::UnboundedReceiver<T>)
where
    W: AsyncWrite + Unpin,
    T: AsRef<[u8]>,
{
    while let Some(buffer) = rx.recv().await {
        if let Err(e) = writer.write_all(buffer.as_ref()).await {
            tracing::debug!("ffmpeg input closed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_to_string<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut text = String::new();
    let _ = reader.read_to_string(&mut text).await;
    text
}

/// Encoder running an ffmpeg child process.
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    /// Spawns ffmpeg for `format` and starts feeding it the stream's frames.
    ///
    /// # Errors
    /// - If the format has no ffmpeg codec plan
    /// - If the stream lacks a track the format needs
    /// - If the process or its input pipe cannot be created
    pub fn spawn(
        ffmpeg: &Path,
        stream: &LiveStream,
        format: &MediaFormat,
        timeslice: Duration,
        sink: EventSink,
    ) -> Result<EncoderHandle> {
        let plan = codec_plan(format).ok_or_else(|| anyhow!("ffmpeg cannot produce {format}"))?;
        let audio = stream
            .audio_settings()
            .ok_or_else(|| anyhow!("stream has no audio track"))?;
        let video = match format.kind() {
            MediaKind::Video => Some(
                stream
                    .video_settings()
                    .ok_or_else(|| anyhow!("stream has no video track"))?,
            ),
            MediaKind::Audio => None,
        };

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"]);

        let mut fifo = None;
        let with_audio = match video {
            Some(video) => {
                cmd.args(video_input_args(video)).args(["-i", "pipe:0"]);
                fifo = open_audio_pipe(&mut cmd, audio)?;
                fifo.is_some()
            }
            None => {
                cmd.args(audio_input_args(audio)).args(["-i", "pipe:0"]);
                true
            }
        };
        cmd.args(output_args(plan, format, with_audio))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Starting ffmpeg encoder: {:?}", cmd);
        let mut child = cmd.spawn().context("Failed to start ffmpeg")?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout unavailable"))?;
        let stderr = child.stderr.take().map(|e| tokio::spawn(read_to_string(e)));

        let mut inputs = Inputs::default();
        if video.is_some() {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(feed(stdin, rx));
            inputs.video = Some(tx);
            if let Some(pipe) = &fifo {
                let (tx, rx) = mpsc::unbounded_channel();
                pipe.spawn_writer(rx);
                inputs.audio = Some(tx);
            }
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(feed(stdin, rx));
            inputs.audio = Some(tx);
        }

        let (tx, commands) = mpsc::unbounded_channel();
        let session = Session {
            child,
            stdout,
            stderr,
            frames: stream.subscribe(),
            commands,
            inputs,
            timeslice,
            sink,
            paused: false,
            fifo,
        };

        tracing::info!("ffmpeg encoder started for {}", format);
        tokio::spawn(session.run());
        Ok(EncoderHandle::new(tx))
    }
}

#[derive(Default)]
struct Inputs {
    video: Option<mpsc::UnboundedSender<std::sync::Arc<[u8]>>>,
    audio: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl Inputs {
    fn dispatch(&self, frame: MediaFrame) {
        match frame {
            MediaFrame::Video(picture) => {
                if let Some(tx) = &self.video {
                    let _ = tx.send(picture);
                }
            }
            MediaFrame::Audio(samples) => {
                if let Some(tx) = &self.audio {
                    let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                    let _ = tx.send(bytes);
                }
            }
        }
    }

    fn close(&mut self) {
        self.video = None;
        self.audio = None;
    }
}

struct Session {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frames: mpsc::UnboundedReceiver<MediaFrame>,
    commands: mpsc::UnboundedReceiver<EncoderCommand>,
    inputs: Inputs,
    timeslice: Duration,
    sink: EventSink,
    paused: bool,
    fifo: Option<FifoInput>,
}

impl Session {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.timeslice, self.timeslice);
        let mut buf = vec![0u8; 64 * 1024];
        let mut pending = Vec::new();
        let mut produced = 0usize;
        let mut accepting = true;
        let mut read_error = None;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv(), if accepting => match command {
                    Some(EncoderCommand::Pause) => self.paused = true,
                    Some(EncoderCommand::Resume) => self.paused = false,
                    Some(EncoderCommand::Stop) | None => {
                        self.close_inputs();
                        accepting = false;
                    }
                },
                frame = self.frames.recv(), if accepting => match frame {
                    Some(frame) if !self.paused => self.inputs.dispatch(frame),
                    Some(_) => {}
                    None => {
                        tracing::info!("Capture ended, finishing ffmpeg recording");
                        self.close_inputs();
                        accepting = false;
                    }
                },
                read = self.stdout.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        produced += n;
                    }
                    Err(e) => {
                        read_error = Some(e.to_string());
                        break;
                    }
                },
                _ = ticker.tick() => self.sink.data(std::mem::take(&mut pending)),
            }
        }

        self.close_inputs();
        self.sink.data(pending);

        let status = self.child.wait().await;
        if let Some(fifo) = &self.fifo {
            fifo.unblock();
        }
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let detail = stderr.lines().last().unwrap_or("").trim().to_string();

        match (status, read_error) {
            (_, Some(e)) => self.sink.failed(format!("Reading ffmpeg output failed: {e}")),
            (Ok(status), None) if status.success() || produced > 0 => {
                if !status.success() {
                    tracing::warn!("ffmpeg exited with {}: {}", status, detail);
                }
                tracing::debug!("ffmpeg encoder produced {} bytes", produced);
                self.sink.finished();
            }
            (Ok(status), None) => self
                .sink
                .failed(format!("ffmpeg exited with {status}: {detail}")),
            (Err(e), None) => self.sink.failed(format!("ffmpeg did not exit cleanly: {e}")),
        }
    }

    /// Forwards frames captured before the stop, then ends ffmpeg's input.
    fn close_inputs(&mut self) {
        self.frames.close();
        while let Ok(frame) = self.frames.try_recv() {
            if !self.paused {
                self.inputs.dispatch(frame);
            }
        }
        self.inputs.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(mime: &str) -> MediaFormat {
        MediaFormat::parse(mime).unwrap()
    }

    #[test]
    fn test_find_ffmpeg() {
        match find_ffmpeg() {
            Ok(path) => println!("Found ffmpeg at: {}", path.display()),
            Err(e) => println!("ffmpeg not found (expected on CI): {e}"),
        }
    }

    #[test]
    fn parses_encoder_table() {
        let listing = "Encoders:\n \
             V..... = Video\n \
             A..... = Audio\n \
             ------\n \
             V....D libvpx-vp9           libvpx VP9 (codec vp9)\n \
             A....D libopus              libopus Opus (codec opus)\n";
        assert_eq!(parse_encoders(listing), vec!["libvpx-vp9", "libopus"]);
    }

    #[test]
    fn codec_parameter_selects_encoders() {
        assert_eq!(
            codec_plan(&format("video/webm;codecs=vp9")),
            Some(CodecPlan {
                video: Some("libvpx-vp9"),
                audio: "libopus"
            })
        );
        assert_eq!(
            codec_plan(&format("video/webm;codecs=\"vp8, vorbis\"")),
            Some(CodecPlan {
                video: Some("libvpx"),
                audio: "libvorbis"
            })
        );
        assert_eq!(codec_plan(&format("video/mp4")).map(|p| p.audio), Some("aac"));
    }

    #[test]
    fn impossible_combinations_have_no_plan() {
        assert_eq!(codec_plan(&format("audio/wav")), None);
        assert_eq!(codec_plan(&format("audio/webm;codecs=vp9")), None);
        assert_eq!(codec_plan(&format("video/ogg")), None);
        assert_eq!(codec_plan(&format("audio/webm;codecs=mystery")), None);
    }

    #[test]
    fn mp4_output_is_fragmented() {
        let mp4 = format("video/mp4");
        let args = output_args(codec_plan(&mp4).unwrap(), &mp4, true);
        assert!(args.contains(&"frag_keyframe+empty_moov+default_base_moof".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn silent_output_drops_audio() {
        let webm = format("video/webm");
        let args = output_args(codec_plan(&webm).unwrap(), &webm, false);
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
    }

    #[test]
    fn raw_inputs_describe_frames() {
        let video = video_input_args(VideoSettings {
            width: 320,
            height: 240,
            frame_rate: 15,
        });
        assert!(video.contains(&"320x240".to_string()));
        let audio = audio_input_args(AudioSettings {
            sample_rate: 48000,
            channels: 1,
        });
        assert_eq!(audio, vec!["-f", "s16le", "-ar", "48000", "-ac", "1"]);
    }
}
