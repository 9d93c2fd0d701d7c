use crate::constants::NS_SCHEMA;
use crate::error::{OnvifError, Result};
use crate::onvif::{OnvifCam, Service};
use crate::soap;
use async_trait::async_trait;
use std::str::FromStr;
use strum_macros::{AsRefStr, EnumString};
use tracing::debug;

/// IR-cut filter (day/night) mode. The wire format accepts exactly
/// `ON`, `OFF` and `AUTO`; anything else fails to parse before a request
/// is ever built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum IrCutMode {
    On,
    Off,
    Auto,
}

/// Snapshot of a video source's imaging settings. Fetched fresh before
/// every mutation; fields the device did not report stay `None` and are
/// omitted when writing back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagingSettings {
    pub brightness: Option<f32>,
    pub color_saturation: Option<f32>,
    pub contrast: Option<f32>,
    pub ir_cut_filter: Option<IrCutMode>,
    pub sharpness: Option<f32>,
}

impl ImagingSettings {
    /// Render as `tt:ImagingSettings20` children, in schema order.
    pub(crate) fn to_xml(&self) -> String {
        let mut xml = String::new();
        if let Some(v) = self.brightness {
            xml.push_str(&format!(r#"<Brightness xmlns="{}">{}</Brightness>"#, NS_SCHEMA, v));
        }
        if let Some(v) = self.color_saturation {
            xml.push_str(&format!(
                r#"<ColorSaturation xmlns="{}">{}</ColorSaturation>"#,
                NS_SCHEMA, v
            ));
        }
        if let Some(v) = self.contrast {
            xml.push_str(&format!(r#"<Contrast xmlns="{}">{}</Contrast>"#, NS_SCHEMA, v));
        }
        if let Some(mode) = self.ir_cut_filter {
            xml.push_str(&format!(
                r#"<IrCutFilter xmlns="{}">{}</IrCutFilter>"#,
                NS_SCHEMA,
                mode.as_ref()
            ));
        }
        if let Some(v) = self.sharpness {
            xml.push_str(&format!(r#"<Sharpness xmlns="{}">{}</Sharpness>"#, NS_SCHEMA, v));
        }
        xml
    }
}

#[async_trait]
pub trait Imaging: Send + Sync {
    /// Fetch the current imaging settings of the selected video source
    async fn get_imaging_settings(&self) -> Result<ImagingSettings>;

    /// Push a whole settings object to the selected video source
    async fn set_imaging_settings(&self, settings: &ImagingSettings) -> Result<()>;

    /// Fetch-modify-write the brightness field
    async fn set_brightness(&self, value: f32) -> Result<()>;

    /// Fetch-modify-write the IR-cut filter mode
    async fn set_ir_cut_mode(&self, mode: IrCutMode) -> Result<()>;
}

#[async_trait]
impl Imaging for OnvifCam {
    async fn get_imaging_settings(&self) -> Result<ImagingSettings> {
        let token = self.video_source_token().await?;
        let inner = format!("<VideoSourceToken>{}</VideoSourceToken>", soap::escape(&token));
        let response = self
            .request(Service::Imaging, "GetImagingSettings", &inner)
            .await?;
        Ok(parse_imaging_settings(&response))
    }

    async fn set_imaging_settings(&self, settings: &ImagingSettings) -> Result<()> {
        let token = self.video_source_token().await?;
        let inner = format!(
            "<VideoSourceToken>{}</VideoSourceToken><ImagingSettings>{}</ImagingSettings><ForcePersistence>true</ForcePersistence>",
            soap::escape(&token),
            settings.to_xml()
        );
        self.request(Service::Imaging, "SetImagingSettings", &inner)
            .await?;
        Ok(())
    }

    async fn set_brightness(&self, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(OnvifError::ValidationError(format!(
                "brightness must be finite, got {}",
                value
            )));
        }

        // Holding the guard across fetch and write keeps concurrent
        // setters from clobbering each other's fields.
        let _guard = self.settings_guard.lock().await;
        let mut settings = self.get_imaging_settings().await?;
        settings.brightness = Some(value);
        self.set_imaging_settings(&settings).await?;
        debug!(brightness = value, "brightness updated");
        Ok(())
    }

    async fn set_ir_cut_mode(&self, mode: IrCutMode) -> Result<()> {
        let _guard = self.settings_guard.lock().await;
        let mut settings = self.get_imaging_settings().await?;
        settings.ir_cut_filter = Some(mode);
        self.set_imaging_settings(&settings).await?;
        debug!(mode = mode.as_ref(), "IR-cut filter updated");
        Ok(())
    }
}

pub(crate) fn parse_imaging_settings(xml: &str) -> ImagingSettings {
    let number = |tag: &str| soap::element_text(xml, tag).and_then(|t| t.parse::<f32>().ok());

    ImagingSettings {
        brightness: number("Brightness"),
        color_saturation: number("ColorSaturation"),
        contrast: number("Contrast"),
        ir_cut_filter: soap::element_text(xml, "IrCutFilter")
            .and_then(|t| IrCutMode::from_str(&t).ok()),
        sharpness: number("Sharpness"),
    }
}
