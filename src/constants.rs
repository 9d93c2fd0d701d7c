use phf::phf_map;

pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const NS_IMAGING: &str = "http://www.onvif.org/ver20/imaging/wsdl";
pub const NS_PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

/// WSDL namespace each operation's body element lives in.
pub static OPERATION_NS: phf::Map<&'static str, &'static str> = phf_map! {
    "GetDeviceInformation" => NS_DEVICE,
    "GetCapabilities" => NS_DEVICE,
    "GetSystemDateAndTime" => NS_DEVICE,
    "GetProfiles" => NS_MEDIA,
    "GetVideoSources" => NS_MEDIA,
    "GetStreamUri" => NS_MEDIA,
    "GetImagingSettings" => NS_IMAGING,
    "SetImagingSettings" => NS_IMAGING,
    "ContinuousMove" => NS_PTZ,
    "Stop" => NS_PTZ,
};

/// Well-known ONVIF fault subcodes and what they mean in practice.
pub static FAULT_CODES: phf::Map<&'static str, &'static str> = phf_map! {
    "ter:NotAuthorized" => "The credentials were rejected",
    "ter:ActionNotSupported" => "The device does not implement this operation",
    "ter:InvalidArgVal" => "An argument value is out of range for this device",
    "ter:NoProfile" => "The requested profile token does not exist",
    "ter:NoSource" => "The requested video source token does not exist",
    "ter:NoImagingForSource" => "The video source has no imaging support",
    "ter:SettingsInvalid" => "The imaging settings were rejected",
    "ter:NoPTZProfile" => "The profile has no PTZ configuration",
    "ter:WellFormed" => "The request XML was malformed",
};

pub const ONVIF_PORT: u16 = 80;
pub const RTSP_PORT: u16 = 554;

pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";
