use crate::error::{OnvifError, Result};
use futures::StreamExt;
use retina::client::{Demuxed, PlayOptions, Session, SessionOptions, SetupOptions};
use retina::codec::CodecItem;
use tokio::time::Duration;
use tracing::debug;
use url::Url;

pub use retina::client::Credentials;

/// One encoded video access unit pulled from the stream.
#[derive(Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub timestamp: retina::Timestamp,
    pub is_keyframe: bool,
    /// RTP packets lost while assembling this frame.
    pub loss: u16,
}

#[derive(Debug)]
pub enum StreamEvent {
    Frame(Frame),
    EndOfStream,
}

/// A live RTSP video connection. Lifecycle is open, poll repeatedly,
/// close; there is no automatic reconnect, a failed read tears the
/// transport down and a new [`VideoStream::open`] is required.
pub struct VideoStream {
    session: Option<Demuxed>,
    url: String,
}

impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("url", &self.url)
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl VideoStream {
    /// DESCRIBE/SETUP/PLAY the given `rtsp://` URL, bounded by `timeout`.
    /// URL shape is validated before any network I/O.
    pub async fn open(
        url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut parsed = Url::parse(url)
            .map_err(|e| OnvifError::ValidationError(format!("bad stream URL: {}", e)))?;
        if parsed.scheme() != "rtsp" {
            return Err(OnvifError::ValidationError(format!(
                "stream URL must use the rtsp scheme, got {}",
                parsed.scheme()
            )));
        }

        // RTSP clients want credentials out of band; lift any userinfo
        // embedded in the URL unless explicit credentials were given.
        let credentials = match (credentials, parsed.username()) {
            (creds @ Some(_), _) | (creds @ None, "") => creds,
            (None, username) => Some(Credentials {
                username: username.to_string(),
                password: parsed.password().unwrap_or("").to_string(),
            }),
        };
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);

        let options = SessionOptions::default()
            .creds(credentials)
            .user_agent("onvif-cam-rs".to_owned());

        let connect = async {
            let mut session = Session::describe(parsed, options)
                .await
                .map_err(|e| OnvifError::ConnectError(e.to_string()))?;

            let video_i = session
                .streams()
                .iter()
                .position(|s| s.media() == "video")
                .ok_or_else(|| {
                    OnvifError::ConnectError("no video stream in SDP".to_string())
                })?;

            session
                .setup(video_i, SetupOptions::default())
                .await
                .map_err(|e| OnvifError::ConnectError(e.to_string()))?;

            let playing = session
                .play(PlayOptions::default().ignore_zero_seq(true))
                .await
                .map_err(|e| OnvifError::ConnectError(e.to_string()))?;

            playing
                .demuxed()
                .map_err(|e| OnvifError::ConnectError(e.to_string()))
        };

        let session = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| {
                OnvifError::ConnectError(format!("connecting to {} timed out", url))
            })??;

        debug!(%url, "stream opened");
        Ok(Self {
            session: Some(session),
            url: url.to_string(),
        })
    }

    /// Pull the next video frame, in capture order. Non-video items
    /// (audio, metadata) interleaved in the transport are skipped.
    /// A read failure tears the transport down and surfaces as
    /// [`OnvifError::StreamError`]; polling after that, or after
    /// [`close`](Self::close), reports end of stream.
    pub async fn poll(&mut self) -> Result<StreamEvent> {
        loop {
            let item = match self.session.as_mut() {
                Some(session) => session.next().await,
                None => return Ok(StreamEvent::EndOfStream),
            };

            match item {
                Some(Ok(CodecItem::VideoFrame(frame))) => {
                    let timestamp = frame.timestamp();
                    let is_keyframe = frame.is_random_access_point();
                    let loss = frame.loss();
                    return Ok(StreamEvent::Frame(Frame {
                        data: frame.into_data(),
                        timestamp,
                        is_keyframe,
                        loss,
                    }));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.session = None;
                    return Err(OnvifError::StreamError(e.to_string()));
                }
                None => {
                    self.session = None;
                    return Ok(StreamEvent::EndOfStream);
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// TEARDOWN and release the transport. A second close is a no-op.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // retina 0.4 has no explicit teardown method; dropping the
        // session issues TEARDOWN in the background (TeardownPolicy::Auto).
        drop(session);
        debug!(url = %self.url, "stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_rtsp_scheme_without_io() {
        let err = VideoStream::open("http://10.0.0.2/stream", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OnvifError::ValidationError(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let err = VideoStream::open("not a url at all", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OnvifError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unreachable_host_fails_within_timeout() {
        let started = tokio::time::Instant::now();
        let err = VideoStream::open(
            "rtsp://127.0.0.1:1/test",
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::ConnectError(_)));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn closing_twice_is_a_no_op() {
        let mut stream = VideoStream {
            session: None,
            url: "rtsp://127.0.0.1:8554/test".to_string(),
        };
        stream.close().await;
        stream.close().await;
        assert!(!stream.is_open());
        assert!(matches!(stream.poll().await, Ok(StreamEvent::EndOfStream)));
    }
}
