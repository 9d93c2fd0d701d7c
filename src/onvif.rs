use crate::commands::{DeviceManagement, Media, MediaProfile, VideoSource};
use crate::constants::{DEVICE_SERVICE_PATH, ONVIF_PORT};
use crate::error::{OnvifError, Result};
use crate::soap;
use dashmap::DashMap;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use strum_macros::AsRefStr;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// ONVIF sub-services resolved during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
pub enum Service {
    Device,
    Media,
    Imaging,
    Ptz,
}

/// Profile and video-source selection for an established session.
#[derive(Default)]
pub(crate) struct MediaSelection {
    pub profiles: Vec<MediaProfile>,
    pub video_sources: Vec<VideoSource>,
    pub profile_token: Option<String>,
    pub video_source_token: Option<String>,
}

pub struct OnvifCam {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) timeout: Duration,

    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,

    pub(crate) http: reqwest::Client,

    // Atomic state
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) clock_offset_ms: Arc<AtomicI64>,

    // Discovered service addresses
    pub(crate) services: Arc<DashMap<Service, String>>,

    pub(crate) selection: Arc<Mutex<MediaSelection>>,

    // Serializes imaging fetch-modify-write sequences
    pub(crate) settings_guard: Arc<Mutex<()>>,
}

impl OnvifCam {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();

        Self {
            host,
            port: ONVIF_PORT,
            timeout: Duration::from_secs(10),
            username: None,
            password: None,
            http: reqwest::Client::new(),
            connected: Arc::new(AtomicBool::new(false)),
            clock_offset_ms: Arc::new(AtomicI64::new(0)),
            services: Arc::new(DashMap::new()),
            selection: Arc::new(Mutex::new(MediaSelection::default())),
            settings_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_onvif_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn onvif_port(&self) -> u16 {
        self.port
    }

    fn device_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, DEVICE_SERVICE_PATH)
    }

    pub(crate) fn service_url(&self, service: Service) -> Result<String> {
        if service == Service::Device {
            return Ok(self.device_url());
        }
        self.services
            .get(&service)
            .map(|url| url.clone())
            .ok_or_else(|| {
                OnvifError::ConnectError(format!(
                    "{} service not advertised by device",
                    service.as_ref()
                ))
            })
    }

    /// Establish a session: sync the device clock, discover sub-services and
    /// enumerate media profiles and video sources. The first profile and
    /// source become the defaults; see [`use_profile`](Self::use_profile) and
    /// [`use_video_source`](Self::use_video_source) to pick others.
    pub async fn connect(&self) -> Result<()> {
        debug!(host = %self.host, port = self.port, "connecting");

        match self.get_system_date_and_time().await {
            Ok(device_utc) => {
                let offset = device_utc - chrono::Utc::now();
                self.clock_offset_ms
                    .store(offset.num_milliseconds(), Ordering::Release);
                debug!(offset_ms = offset.num_milliseconds(), "device clock synced");
            }
            Err(e) => {
                // WS-Security tokens will use our local clock
                warn!(error = %e, "clock sync failed, assuming no drift");
                self.clock_offset_ms.store(0, Ordering::Release);
            }
        }

        let caps = self
            .get_capabilities()
            .await
            .map_err(|e| OnvifError::ConnectError(format!("service discovery failed: {}", e)))?;

        self.services.clear();
        if let Some(url) = caps.media_xaddr {
            self.services.insert(Service::Media, url);
        }
        if let Some(url) = caps.imaging_xaddr {
            self.services.insert(Service::Imaging, url);
        }
        if let Some(url) = caps.ptz_xaddr {
            self.services.insert(Service::Ptz, url);
        }

        let profiles = self
            .get_profiles()
            .await
            .map_err(|e| OnvifError::ConnectError(format!("profile enumeration failed: {}", e)))?;
        if profiles.is_empty() {
            return Err(OnvifError::ConnectError(
                "device reports no media profiles".to_string(),
            ));
        }

        let video_sources = self.get_video_sources().await.map_err(|e| {
            OnvifError::ConnectError(format!("video source enumeration failed: {}", e))
        })?;
        if video_sources.is_empty() {
            return Err(OnvifError::ConnectError(
                "device reports no video sources".to_string(),
            ));
        }

        let mut selection = self.selection.lock().await;
        selection.profile_token = Some(profiles[0].token.clone());
        selection.video_source_token = Some(video_sources[0].token.clone());
        info!(
            profile = %profiles[0].token,
            video_source = %video_sources[0].token,
            profiles = profiles.len(),
            video_sources = video_sources.len(),
            "session established"
        );
        selection.profiles = profiles;
        selection.video_sources = video_sources;
        drop(selection);

        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Tear the session down. ONVIF is stateless over HTTP, so this only
    /// clears local discovery state.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        self.services.clear();
        *self.selection.lock().await = MediaSelection::default();
    }

    /// Media profiles enumerated at connect time.
    pub async fn profiles(&self) -> Vec<MediaProfile> {
        self.selection.lock().await.profiles.clone()
    }

    /// Video sources enumerated at connect time.
    pub async fn video_sources(&self) -> Vec<VideoSource> {
        self.selection.lock().await.video_sources.clone()
    }

    pub async fn selected_profile(&self) -> Option<String> {
        self.selection.lock().await.profile_token.clone()
    }

    pub async fn selected_video_source(&self) -> Option<String> {
        self.selection.lock().await.video_source_token.clone()
    }

    /// Switch the session to another enumerated profile.
    pub async fn use_profile(&self, token: &str) -> Result<()> {
        let mut selection = self.selection.lock().await;
        if !selection.profiles.iter().any(|p| p.token == token) {
            return Err(OnvifError::ValidationError(format!(
                "unknown profile token: {}",
                token
            )));
        }
        selection.profile_token = Some(token.to_string());
        Ok(())
    }

    /// Switch the session to another enumerated video source.
    pub async fn use_video_source(&self, token: &str) -> Result<()> {
        let mut selection = self.selection.lock().await;
        if !selection.video_sources.iter().any(|s| s.token == token) {
            return Err(OnvifError::ValidationError(format!(
                "unknown video source token: {}",
                token
            )));
        }
        selection.video_source_token = Some(token.to_string());
        Ok(())
    }

    pub(crate) async fn profile_token(&self) -> Result<String> {
        self.selection
            .lock()
            .await
            .profile_token
            .clone()
            .ok_or(OnvifError::NotConnected)
    }

    pub(crate) async fn video_source_token(&self) -> Result<String> {
        self.selection
            .lock()
            .await
            .video_source_token
            .clone()
            .ok_or(OnvifError::NotConnected)
    }

    /// Send one SOAP request to a sub-service and return the response body.
    /// SOAP faults come back as [`OnvifError::ProtocolFault`].
    pub(crate) async fn request(
        &self,
        service: Service,
        operation: &str,
        inner: &str,
    ) -> Result<String> {
        let url = self.service_url(service)?;
        let body = soap::operation_body(operation, inner)?;

        let security = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let offset =
                    chrono::Duration::milliseconds(self.clock_offset_ms.load(Ordering::Acquire));
                soap::security_header(user, pass, offset)
            }
            _ => String::new(),
        };
        let envelope = soap::envelope(&security, &body);

        debug!(%url, operation, "sending request");

        let exchange = async {
            let resp = self
                .http
                .post(&url)
                .header(CONTENT_TYPE, "application/soap+xml; charset=utf-8")
                .body(envelope)
                .send()
                .await?;
            let status = resp.status();
            let text = resp.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                OnvifError::ConnectError(format!("{} request to {} timed out", operation, url))
            })??;

        if let Some((code, reason)) = soap::parse_fault(&text) {
            if let Some(explanation) = crate::constants::FAULT_CODES.get(code.as_str()) {
                warn!(%code, %reason, explanation = *explanation, operation, "device returned fault");
            } else {
                warn!(%code, %reason, operation, "device returned fault");
            }
            return Err(OnvifError::ProtocolFault { code, reason });
        }

        if !status.is_success() {
            return Err(OnvifError::ConnectError(format!(
                "{} request failed with HTTP {}",
                operation, status
            )));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DeviceManagement, Imaging, IrCutMode, Media};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FAULT: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault>
        <s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>ter:NotAuthorized</s:Value></s:Subcode></s:Code>
        <s:Reason><s:Text xml:lang="en">The credentials were rejected</s:Text></s:Reason>
    </s:Fault></s:Body></s:Envelope>"#;

    fn wrap(body: &str) -> String {
        format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body>{}</s:Body></s:Envelope>"#,
            body
        )
    }

    fn canned_response(request: &str, port: u16) -> String {
        if request.contains("GetSystemDateAndTime") {
            wrap(
                r#"<tds:GetSystemDateAndTimeResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><tds:SystemDateAndTime>
                    <tt:UTCDateTime>
                        <tt:Time><tt:Hour>12</tt:Hour><tt:Minute>0</tt:Minute><tt:Second>0</tt:Second></tt:Time>
                        <tt:Date><tt:Year>2026</tt:Year><tt:Month>1</tt:Month><tt:Day>1</tt:Day></tt:Date>
                    </tt:UTCDateTime>
                </tds:SystemDateAndTime></tds:GetSystemDateAndTimeResponse>"#,
            )
        } else if request.contains("GetCapabilities") {
            wrap(&format!(
                r#"<tds:GetCapabilitiesResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><tds:Capabilities>
                    <tt:Media><tt:XAddr>http://127.0.0.1:{p}/onvif/media</tt:XAddr></tt:Media>
                    <tt:Imaging><tt:XAddr>http://127.0.0.1:{p}/onvif/imaging</tt:XAddr></tt:Imaging>
                    <tt:PTZ><tt:XAddr>http://127.0.0.1:{p}/onvif/ptz</tt:XAddr></tt:PTZ>
                </tds:Capabilities></tds:GetCapabilitiesResponse>"#,
                p = port
            ))
        } else if request.contains("GetProfiles") {
            wrap(
                r#"<trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
                    <trt:Profiles token="profile_1"><tt:Name>MainStream</tt:Name></trt:Profiles>
                    <trt:Profiles token="profile_2"><tt:Name>SubStream</tt:Name></trt:Profiles>
                </trt:GetProfilesResponse>"#,
            )
        } else if request.contains("GetVideoSources") {
            wrap(
                r#"<trt:GetVideoSourcesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
                    <trt:VideoSources token="src_0"><tt:Framerate>25</tt:Framerate></trt:VideoSources>
                </trt:GetVideoSourcesResponse>"#,
            )
        } else if request.contains("GetDeviceInformation") {
            wrap(
                r#"<tds:GetDeviceInformationResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
                    <tds:Manufacturer>Acme</tds:Manufacturer>
                    <tds:Model>PT-1000</tds:Model>
                    <tds:FirmwareVersion>2.800</tds:FirmwareVersion>
                    <tds:SerialNumber>0042</tds:SerialNumber>
                </tds:GetDeviceInformationResponse>"#,
            )
        } else if request.contains("GetStreamUri") {
            wrap(
                r#"<trt:GetStreamUriResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><trt:MediaUri>
                    <tt:Uri>rtsp://192.168.1.64:554/Streaming/Channels/101</tt:Uri>
                </trt:MediaUri></trt:GetStreamUriResponse>"#,
            )
        } else if request.contains("GetImagingSettings") {
            wrap(
                r#"<timg:GetImagingSettingsResponse xmlns:timg="http://www.onvif.org/ver20/imaging/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><timg:ImagingSettings>
                    <tt:Brightness>50</tt:Brightness>
                    <tt:IrCutFilter>AUTO</tt:IrCutFilter>
                </timg:ImagingSettings></timg:GetImagingSettingsResponse>"#,
            )
        } else if request.contains("SetImagingSettings") {
            wrap(r#"<timg:SetImagingSettingsResponse xmlns:timg="http://www.onvif.org/ver20/imaging/wsdl"/>"#)
        } else if request.contains("ContinuousMove") || request.contains("Stop") {
            wrap(r#"<tptz:ContinuousMoveResponse xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"/>"#)
        } else {
            FAULT.to_string()
        }
    }

    async fn read_http_request(sock: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = sock.read(&mut chunk).await else { break };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// A loopback device answering every operation with a canned response.
    async fn spawn_mock_device() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let request = read_http_request(&mut sock).await;
                    let body = canned_response(&request, port);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/soap+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        port
    }

    fn cam_for(port: u16) -> OnvifCam {
        OnvifCam::new("127.0.0.1")
            .with_onvif_port(port)
            .with_credentials("admin", "pw")
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn connect_discovers_services_and_selects_first_profile() {
        let port = spawn_mock_device().await;
        let cam = cam_for(port);

        cam.connect().await.unwrap();
        assert!(cam.is_connected());
        assert_eq!(cam.profiles().await.len(), 2);
        assert_eq!(cam.selected_profile().await.as_deref(), Some("profile_1"));
        assert_eq!(cam.selected_video_source().await.as_deref(), Some("src_0"));

        cam.use_profile("profile_2").await.unwrap();
        assert_eq!(cam.selected_profile().await.as_deref(), Some("profile_2"));
        assert!(matches!(
            cam.use_profile("profile_9").await,
            Err(OnvifError::ValidationError(_))
        ));

        cam.close().await;
        assert!(!cam.is_connected());
        assert!(cam.profiles().await.is_empty());
    }

    #[tokio::test]
    async fn device_info_round_trip() {
        let port = spawn_mock_device().await;
        let cam = cam_for(port);

        let info = cam.get_device_info().await.unwrap();
        assert_eq!(info.manufacturer, "Acme");
        assert_eq!(info.model, "PT-1000");
        assert_eq!(info.firmware_version, "2.800");
    }

    #[tokio::test]
    async fn stream_uri_carries_session_credentials() {
        let port = spawn_mock_device().await;
        let cam = cam_for(port);
        cam.connect().await.unwrap();

        let uri = cam.get_stream_uri().await.unwrap();
        assert_eq!(uri, "rtsp://admin:pw@192.168.1.64:554/Streaming/Channels/101");
    }

    #[tokio::test]
    async fn brightness_fetch_modify_write_round_trip() {
        let port = spawn_mock_device().await;
        let cam = cam_for(port);
        cam.connect().await.unwrap();

        cam.set_brightness(60.0).await.unwrap();
        cam.set_ir_cut_mode(IrCutMode::Off).await.unwrap();
    }

    #[tokio::test]
    async fn fault_response_maps_to_protocol_fault() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let _ = read_http_request(&mut sock).await;
                let response = format!(
                    "HTTP/1.1 400 Bad Request\r\nContent-Type: application/soap+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    FAULT.len(),
                    FAULT
                );
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        let cam = cam_for(port);
        let err = cam.get_device_info().await.unwrap_err();
        match err {
            OnvifError::ProtocolFault { code, reason } => {
                assert_eq!(code, "ter:NotAuthorized");
                assert!(reason.contains("rejected"));
            }
            other => panic!("expected ProtocolFault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn silent_device_times_out_as_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    break;
                };
                // Hold the connection open without answering.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(sock);
                });
            }
        });

        let cam = OnvifCam::new("127.0.0.1")
            .with_onvif_port(port)
            .with_timeout(Duration::from_millis(300));
        let err = cam.get_device_info().await.unwrap_err();
        assert!(matches!(err, OnvifError::ConnectError(_)));
    }

    #[tokio::test]
    async fn token_bearing_operations_require_a_session() {
        let cam = OnvifCam::new("192.0.2.1");
        assert!(matches!(
            cam.get_stream_uri().await,
            Err(OnvifError::NotConnected)
        ));
        assert!(matches!(
            cam.set_ir_cut_mode(IrCutMode::Auto).await,
            Err(OnvifError::NotConnected)
        ));
    }
}
