//! [`MjpegSource`] – reads the owl's stereo camera stream over HTTP.
//!
//! The camera server publishes a `multipart/x-mixed-replace` MJPEG stream.
//! Rather than parsing multipart boundaries, the reader scans the byte
//! stream for JPEG start/end markers, which is robust against servers that
//! get the multipart headers slightly wrong.
//!
//! The HTTP body is read on a dedicated thread that decodes and splits each
//! frame and hands it over a small channel.  [`acquire`][FrameSource::acquire]
//! only waits on that channel, so a silent camera costs a tick no more than
//! its frame budget, whatever the socket read timeout.
//!
//! A read timeout is a stall: the reader thread exits and the stream is
//! reopened on the next acquire.  End of stream, a failed reopen, or frames
//! of the wrong size are fatal.

use std::io::Read;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use owl_types::OwlError;
use reqwest::blocking::{Client, Response};
use tracing::{debug, info, warn};

use crate::camera::{Acquisition, FrameSource, RasterFrame, StereoFrame, StereoGeometry, split_stereo};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
/// Discard buffered bytes if no complete JPEG shows up within this many.
const MAX_BUFFER: usize = 8 * 1024 * 1024;
const CHUNK: usize = 16 * 1024;
/// Decoded frames waiting for the control loop.  Frames arriving while the
/// queue is full are dropped.
const FRAME_QUEUE: usize = 2;

/// What the reader thread reports.  Every variant but `Frame` and
/// `Undecodable` is the thread's last message.
enum StreamEvent {
    Frame(StereoFrame),
    Undecodable(String),
    TimedOut,
    Lost(String),
}

/// HTTP MJPEG frame source.
pub struct MjpegSource {
    url: String,
    geometry: StereoGeometry,
    client: Client,
    events: Option<Receiver<StreamEvent>>,
    /// A final event found while skipping ahead to the newest frame.
    pending: Option<StreamEvent>,
}

impl MjpegSource {
    /// Connect to `url` and start reading.  `read_timeout` bounds every
    /// socket read on the reader thread; a read that hits it ends the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`OwlError::SourceUnavailable`] if the stream cannot be
    /// opened.
    pub fn open(url: &str, geometry: StereoGeometry, read_timeout: Duration) -> Result<Self, OwlError> {
        let client = Client::builder()
            .timeout(read_timeout)
            .build()
            .map_err(|e| unavailable(url, format!("HTTP client: {e}")))?;
        let response = connect(&client, url).map_err(|e| unavailable(url, e))?;
        let mut source = Self {
            url: url.to_string(),
            geometry,
            client,
            events: None,
            pending: None,
        };
        source.events = Some(source.spawn_reader(Some(response))?);
        info!(url, "video stream opened");
        Ok(source)
    }

    /// Start a reader thread.  With no `response` the thread connects first,
    /// so a reopen never blocks the caller.
    fn spawn_reader(&self, response: Option<Response>) -> Result<Receiver<StreamEvent>, OwlError> {
        let (tx, rx) = bounded(FRAME_QUEUE);
        let reader = StreamReader {
            url: self.url.clone(),
            geometry: self.geometry,
            client: self.client.clone(),
            events: tx,
        };
        thread::Builder::new()
            .name("owl-mjpeg".to_string())
            .spawn(move || reader.run(response))
            .map_err(|e| unavailable(&self.url, format!("reader thread: {e}")))?;
        Ok(rx)
    }

    /// Wait up to `timeout` for the reader, skipping to the newest frame
    /// when several are queued.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<StreamEvent>, OwlError> {
        let Some(events) = self.events.as_ref() else {
            return Ok(None);
        };
        let mut event = match events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(unavailable(&self.url, "stream reader stopped".to_string()));
            }
        };
        while matches!(event, StreamEvent::Frame(_)) {
            match events.try_recv() {
                Ok(newer @ StreamEvent::Frame(_)) => event = newer,
                Ok(other) => {
                    self.pending = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(Some(event))
    }
}

impl FrameSource for MjpegSource {
    fn source_url(&self) -> &str {
        &self.url
    }

    fn acquire(&mut self, timeout: Duration) -> Result<Acquisition, OwlError> {
        if self.events.is_none() {
            debug!(url = %self.url, "reopening video stream");
            self.events = Some(self.spawn_reader(None)?);
        }
        let event = match self.pending.take() {
            Some(event) => event,
            None => match self.next_event(timeout)? {
                Some(event) => event,
                None => return Ok(Acquisition::Stalled),
            },
        };

        match event {
            StreamEvent::Frame(pair) => Ok(Acquisition::Frame(pair)),
            StreamEvent::Undecodable(e) => {
                warn!(url = %self.url, error = %e, "dropping undecodable frame");
                Ok(Acquisition::Stalled)
            }
            StreamEvent::TimedOut => {
                warn!(url = %self.url, "video read timed out; reconnecting next tick");
                self.events = None;
                Ok(Acquisition::Stalled)
            }
            StreamEvent::Lost(details) => {
                self.events = None;
                Err(unavailable(&self.url, details))
            }
        }
    }
}

/// Owns one HTTP connection on the reader thread.
struct StreamReader {
    url: String,
    geometry: StereoGeometry,
    client: Client,
    events: Sender<StreamEvent>,
}

impl StreamReader {
    fn run(self, response: Option<Response>) {
        let mut response = match response {
            Some(response) => response,
            None => match connect(&self.client, &self.url) {
                Ok(response) => {
                    debug!(url = %self.url, "video stream reopened");
                    response
                }
                Err(e) => {
                    let _ = self.events.send(StreamEvent::Lost(e));
                    return;
                }
            },
        };

        let mut buf = Vec::with_capacity(CHUNK * 8);
        let mut chunk = vec![0u8; CHUNK];
        loop {
            while let Some(jpeg) = take_jpeg(&mut buf) {
                if !self.deliver(&jpeg) {
                    return;
                }
            }
            let last = match response.read(&mut chunk) {
                Ok(0) => StreamEvent::Lost("stream ended".to_string()),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_BUFFER {
                        warn!(url = %self.url, "no JPEG frame in {} bytes; resyncing", buf.len());
                        buf.clear();
                    }
                    continue;
                }
                Err(e) if is_timeout(&e) => StreamEvent::TimedOut,
                Err(e) => StreamEvent::Lost(e.to_string()),
            };
            let _ = self.events.send(last);
            return;
        }
    }

    /// Decode, split and queue one JPEG.  Returns `false` when the reader
    /// should stop.
    fn deliver(&self, jpeg: &[u8]) -> bool {
        let event = match decode(jpeg) {
            Ok(frame) => match split_stereo(&frame, &self.geometry) {
                Ok(pair) => StreamEvent::Frame(pair),
                Err(e) => {
                    let _ = self.events.send(StreamEvent::Lost(e.to_string()));
                    return false;
                }
            },
            Err(e) => StreamEvent::Undecodable(e.to_string()),
        };
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(url = %self.url, "control loop behind; frame dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

fn connect(client: &Client, url: &str) -> Result<Response, String> {
    client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())
}

fn decode(jpeg: &[u8]) -> Result<RasterFrame, image::ImageError> {
    let rgb = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(RasterFrame {
        width,
        height,
        data: rgb.into_raw(),
    })
}

fn unavailable(url: &str, details: String) -> OwlError {
    OwlError::SourceUnavailable {
        source_url: url.to_string(),
        details,
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(|re| re.is_timeout())
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

/// Remove and return the first complete JPEG image in `buf`.
///
/// Bytes before the image (multipart headers, partial frames) are
/// discarded along with it.  Returns `None`, leaving the buffer untouched
/// apart from leading garbage, if no complete image is buffered yet.
fn take_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let Some(start) = find(buf, &SOI) else {
        // Keep a trailing 0xFF that may be the first half of a marker.
        let keep = usize::from(buf.last() == Some(&0xFF));
        let drop = buf.len() - keep;
        buf.drain(..drop);
        return None;
    };
    if start > 0 {
        buf.drain(..start);
    }
    let end = find(&buf[2..], &EOI)? + 2 + EOI.len();
    let jpeg: Vec<u8> = buf.drain(..end).collect();
    Some(jpeg)
}
