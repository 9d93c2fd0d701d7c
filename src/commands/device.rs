use crate::error::{OnvifError, Result};
use crate::onvif::{OnvifCam, Service};
use crate::soap;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (fw {}, sn {})",
            self.manufacturer, self.model, self.firmware_version, self.serial_number
        )
    }
}

/// Sub-service addresses a device advertises.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub media_xaddr: Option<String>,
    pub imaging_xaddr: Option<String>,
    pub ptz_xaddr: Option<String>,
}

#[async_trait]
pub trait DeviceManagement: Send + Sync {
    /// Get manufacturer, model and firmware details
    async fn get_device_info(&self) -> Result<DeviceInfo>;

    /// Discover which sub-services the device offers
    async fn get_capabilities(&self) -> Result<Capabilities>;

    /// Get the device's UTC clock
    async fn get_system_date_and_time(&self) -> Result<DateTime<Utc>>;
}

#[async_trait]
impl DeviceManagement for OnvifCam {
    async fn get_device_info(&self) -> Result<DeviceInfo> {
        let response = self
            .request(Service::Device, "GetDeviceInformation", "")
            .await?;

        Ok(DeviceInfo {
            manufacturer: soap::element_text(&response, "Manufacturer").unwrap_or_default(),
            model: soap::element_text(&response, "Model").unwrap_or_default(),
            firmware_version: soap::element_text(&response, "FirmwareVersion").unwrap_or_default(),
            serial_number: soap::element_text(&response, "SerialNumber").unwrap_or_default(),
        })
    }

    async fn get_capabilities(&self) -> Result<Capabilities> {
        let inner = r#"<Category>All</Category>"#;
        let response = self.request(Service::Device, "GetCapabilities", inner).await?;
        Ok(parse_capabilities(&response))
    }

    async fn get_system_date_and_time(&self) -> Result<DateTime<Utc>> {
        let response = self
            .request(Service::Device, "GetSystemDateAndTime", "")
            .await?;
        parse_utc_datetime(&response).ok_or_else(|| {
            OnvifError::ProtocolFault {
                code: "ter:WellFormed".to_string(),
                reason: "GetSystemDateAndTime response had no UTC time".to_string(),
            }
        })
    }
}

pub(crate) fn parse_capabilities(xml: &str) -> Capabilities {
    let mut caps = Capabilities::default();
    let mut reader = Reader::from_str(xml);
    let mut category: Option<String> = None;
    let mut in_xaddr = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = soap::local_name(e.name().as_ref());
                match name.as_str() {
                    "Media" | "Imaging" | "PTZ" => category = Some(name),
                    "XAddr" => in_xaddr = category.is_some(),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) if in_xaddr => {
                if let Ok(text) = t.unescape() {
                    let url = text.trim().to_string();
                    match category.as_deref() {
                        Some("Media") => caps.media_xaddr = Some(url),
                        Some("Imaging") => caps.imaging_xaddr = Some(url),
                        Some("PTZ") => caps.ptz_xaddr = Some(url),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = soap::local_name(e.name().as_ref());
                match name.as_str() {
                    "Media" | "Imaging" | "PTZ" => category = None,
                    "XAddr" => in_xaddr = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    caps
}

pub(crate) fn parse_utc_datetime(xml: &str) -> Option<DateTime<Utc>> {
    let mut reader = Reader::from_str(xml);
    let mut in_utc = false;
    let mut field: Option<String> = None;
    let mut parts = [None::<u32>; 6]; // year month day hour minute second

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = soap::local_name(e.name().as_ref());
                match name.as_str() {
                    "UTCDateTime" => in_utc = true,
                    "Year" | "Month" | "Day" | "Hour" | "Minute" | "Second" if in_utc => {
                        field = Some(name)
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) if in_utc => {
                if let (Some(name), Ok(text)) = (field.as_deref(), t.unescape()) {
                    let value = text.trim().parse::<u32>().ok();
                    let slot = match name {
                        "Year" => 0,
                        "Month" => 1,
                        "Day" => 2,
                        "Hour" => 3,
                        "Minute" => 4,
                        _ => 5,
                    };
                    parts[slot] = value;
                }
            }
            Ok(Event::End(e)) => {
                let name = soap::local_name(e.name().as_ref());
                if name == "UTCDateTime" {
                    break;
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    let [Some(year), Some(month), Some(day), Some(hour), Some(minute), Some(second)] = parts
    else {
        return None;
    };
    Utc.with_ymd_and_hms(year as i32, month, day, hour, minute, second)
        .single()
}
