//! Stream relay
//!
//! Fetches an HTTP media stream and pipes it through ffmpeg onto
//! stdout as MPEG-TS, the transport an external recorder consumes.
//! Master HLS playlists are resolved to a single variant first and
//! handed to ffmpeg by URL; anything else is piped through stdin.

use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures_util::StreamExt;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// MPEG-TS packets are 188 bytes; read a couple hundred at a time.
const READ_BUF_SIZE: usize = 188 * 200;

/// How long a silent ffmpeg stdout is tolerated before rechecking.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    Worst,
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "worst" => Ok(Quality::Worst),
            other => Err(format!("unknown quality: {other} (use best or worst)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub url: String,
    pub quality: Quality,
    pub quiet: bool,
}

/// One variant entry from a master HLS playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsVariant {
    pub bandwidth: u64,
    pub uri: String,
}

/// Extract variant streams from a master playlist.
///
/// Only `#EXT-X-STREAM-INF` entries count; a media playlist (segments,
/// no variants) yields an empty list.
pub fn parse_master_playlist(text: &str) -> Vec<HlsVariant> {
    let mut variants = Vec::new();
    let mut pending_bandwidth: Option<u64> = None;

    for line in text.lines().map(str::trim) {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending_bandwidth = Some(
                attrs
                    .split(',')
                    .find_map(|attr| attr.trim().strip_prefix("BANDWIDTH="))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            );
        } else if line.starts_with('#') || line.is_empty() {
            continue;
        } else if let Some(bandwidth) = pending_bandwidth.take() {
            variants.push(HlsVariant {
                bandwidth,
                uri: line.to_owned(),
            });
        }
    }
    variants
}

/// Pick a variant by bandwidth.
pub fn select_variant(variants: &[HlsVariant], quality: Quality) -> Option<&HlsVariant> {
    match quality {
        Quality::Best => variants.iter().max_by_key(|v| v.bandwidth),
        Quality::Worst => variants.iter().min_by_key(|v| v.bandwidth),
    }
}

/// Resolve a playlist entry against the playlist's own URL.
pub fn resolve_variant_url(playlist_url: &Url, uri: &str) -> Result<Url> {
    playlist_url
        .join(uri)
        .with_context(|| format!("invalid variant URI: {uri}"))
}

fn looks_like_playlist(content_type: Option<&str>, url: &Url) -> bool {
    if let Some(ct) = content_type {
        if ct.contains("mpegurl") {
            return true;
        }
    }
    url.path().ends_with(".m3u8")
}

/// The two ways an input reaches ffmpeg.
enum Input {
    /// ffmpeg fetches the variant playlist itself.
    Url(Url),
    /// We pipe the response body into ffmpeg stdin.
    Pipe(reqwest::Response),
}

/// ffmpeg argument list for the chosen input.
fn ffmpeg_args(input: &Input, quiet: bool) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    if quiet {
        args.extend(["-hide_banner", "-nostats", "-loglevel", "panic"].map(String::from));
    }
    match input {
        Input::Url(url) => {
            // Start from the live edge and re-open connections per segment.
            args.extend(["-live_start_index", "-1", "-http_persistent", "0"].map(String::from));
            args.push("-i".into());
            args.push(url.to_string());
        }
        Input::Pipe(_) => {
            args.extend(["-re", "-i", "pipe:"].map(String::from));
        }
    }
    args.extend(["-codec", "copy", "-f", "mpegts", "pipe:"].map(String::from));
    args
}

fn find_ffmpeg() -> Result<PathBuf> {
    which::which("ffmpeg").context("ffmpeg not found in PATH")
}

/// Open the URL and decide how ffmpeg should consume it.
async fn open_input(client: &reqwest::Client, opts: &RelayOptions) -> Result<Input> {
    let url = Url::parse(&opts.url).with_context(|| format!("invalid URL: {}", opts.url))?;
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("failed to open stream: {url}"))?
        .error_for_status()
        .with_context(|| format!("stream rejected: {url}"))?;

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if !looks_like_playlist(content_type.as_deref(), resp.url()) {
        info!("Direct stream, piping body into ffmpeg");
        return Ok(Input::Pipe(resp));
    }

    let playlist_url = resp.url().clone();
    let text = resp.text().await.context("failed to read playlist")?;
    let variants = parse_master_playlist(&text);
    if variants.is_empty() {
        // A media playlist; let ffmpeg follow the segments itself.
        info!("Media playlist, handing URL to ffmpeg");
        return Ok(Input::Url(playlist_url));
    }

    let variant = select_variant(&variants, opts.quality)
        .ok_or_else(|| anyhow!("no variant streams in playlist"))?;
    let variant_url = resolve_variant_url(&playlist_url, &variant.uri)?;
    info!(
        "Selected {:?} variant ({} bps): {variant_url}",
        opts.quality, variant.bandwidth
    );
    Ok(Input::Url(variant_url))
}

/// Flip the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_task(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => warn!("handling SIGINT"),
                        _ = sigterm.recv() => warn!("handling SIGTERM"),
                    }
                }
                // Returning here would drop the sender and stop the relay.
                Err(e) => {
                    warn!("Failed to install SIGTERM handler, SIGINT only: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    warn!("handling SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            warn!("handling interrupt");
        }
        let _ = shutdown_tx.send(true);
    });
}

async fn shutdown_child(mut child: Child) {
    info!("Stopping ffmpeg");
    let _ = child.kill().await;
    let _ = child.wait().await;
    info!("ffmpeg finished");
}

/// Run the relay until the stream ends or a signal arrives.
pub async fn run(opts: &RelayOptions) -> Result<()> {
    let ffmpeg_path = find_ffmpeg()?;
    debug!("Using ffmpeg: {ffmpeg_path:?}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_task(shutdown_tx);

    let client = reqwest::Client::new();
    let input = open_input(&client, opts).await?;

    let args = ffmpeg_args(&input, opts.quiet);
    info!("Running ffmpeg {}", args.join(" "));

    let mut cmd = Command::new(&ffmpeg_path);
    cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if matches!(input, Input::Pipe(_)) {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.spawn().context("failed to spawn ffmpeg")?;

    let stderr = child
        .stderr
        .take()
        .context("failed to take ffmpeg stderr")?;
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!("ffmpeg: {line}");
        }
    });

    if let Input::Pipe(resp) = input {
        let stdin = child
            .stdin
            .take()
            .context("failed to take ffmpeg stdin")?;
        let feed_rx = shutdown_rx.clone();
        tokio::spawn(feed_stdin(resp, stdin, feed_rx));
    }

    let result = pump_stdout(&mut child, shutdown_rx).await;
    shutdown_child(child).await;
    result
}

/// Copy the HTTP body into ffmpeg stdin until either side closes.
async fn feed_stdin(
    resp: reqwest::Response,
    mut stdin: tokio::process::ChildStdin,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut body = resp.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = shutdown_rx.changed() => break,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                debug!("read {} bytes", bytes.len());
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!("broken pipe (ffmpeg died?): {e}");
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("failed to read data from stream: {e}");
                break;
            }
            None => {
                info!("end of stream");
                break;
            }
        }
    }
    // Dropping stdin signals EOF so ffmpeg flushes and exits.
    let _ = stdin.shutdown().await;
}

/// Copy ffmpeg stdout to our stdout until EOF or shutdown.
async fn pump_stdout(child: &mut Child, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let mut child_out = child
        .stdout
        .take()
        .context("failed to take ffmpeg stdout")?;
    let mut out = tokio::io::stdout();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let read = tokio::select! {
            _ = shutdown_rx.changed() => break,
            read = tokio::time::timeout(READ_TIMEOUT, child_out.read(&mut buf)) => read,
        };
        match read {
            Ok(Ok(0)) => {
                info!("ffmpeg closed stdout");
                break;
            }
            Ok(Ok(n)) => {
                debug!("processed {n} bytes");
                out.write_all(&buf[..n])
                    .await
                    .context("failed to write transport stream")?;
                out.flush().await.context("failed to flush stdout")?;
            }
            Ok(Err(e)) => bail!("failed to read from ffmpeg: {e}"),
            Err(_) => {
                // Timed out; if ffmpeg is gone there is nothing left to read.
                if let Ok(Some(status)) = child.try_wait() {
                    info!("ffmpeg exited: {status}");
                    break;
                }
                debug!("no output for {READ_TIMEOUT:?}, still waiting");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "\
#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1280x720
hi/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=842x480
mid/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=640000
lo/index.m3u8
";

    const MEDIA: &str = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
segment0.ts
#EXTINF:6.0,
segment1.ts
";

    #[test]
    fn test_parse_master_playlist() {
        let variants = parse_master_playlist(MASTER);
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].bandwidth, 2560000);
        assert_eq!(variants[0].uri, "hi/index.m3u8");
        assert_eq!(variants[2].bandwidth, 640000);
    }

    #[test]
    fn test_media_playlist_has_no_variants() {
        assert!(parse_master_playlist(MEDIA).is_empty());
    }

    #[test]
    fn test_select_variant_by_bandwidth() {
        let variants = parse_master_playlist(MASTER);
        assert_eq!(
            select_variant(&variants, Quality::Best).unwrap().uri,
            "hi/index.m3u8"
        );
        assert_eq!(
            select_variant(&variants, Quality::Worst).unwrap().uri,
            "lo/index.m3u8"
        );
        assert!(select_variant(&[], Quality::Best).is_none());
    }

    #[test]
    fn test_resolve_variant_url() {
        let base = Url::parse("http://example.com/live/master.m3u8").unwrap();
        let relative = resolve_variant_url(&base, "hi/index.m3u8").unwrap();
        assert_eq!(relative.as_str(), "http://example.com/live/hi/index.m3u8");

        let absolute =
            resolve_variant_url(&base, "http://cdn.example.com/hi.m3u8").unwrap();
        assert_eq!(absolute.as_str(), "http://cdn.example.com/hi.m3u8");
    }

    #[test]
    fn test_looks_like_playlist() {
        let hls = Url::parse("http://example.com/live/master.m3u8").unwrap();
        let ts = Url::parse("http://example.com/live/stream.ts").unwrap();
        assert!(looks_like_playlist(None, &hls));
        assert!(looks_like_playlist(
            Some("application/vnd.apple.mpegurl"),
            &ts
        ));
        assert!(!looks_like_playlist(Some("video/mp2t"), &ts));
    }

    #[tokio::test]
    async fn test_signal_task_keeps_shutdown_pending() {
        let (tx, mut rx) = watch::channel(false);
        spawn_signal_task(tx);

        // No signal arrived, so the token must stay unset; a dropped
        // sender would complete changed() immediately.
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        assert!(outcome.is_err(), "shutdown fired without a signal");
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!("WORST".parse::<Quality>().unwrap(), Quality::Worst);
        assert!("medium".parse::<Quality>().is_err());
    }
}
