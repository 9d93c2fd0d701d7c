use crate::constants::NS_SCHEMA;
use crate::error::{OnvifError, Result};
use crate::onvif::{OnvifCam, Service};
use crate::soap;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Ptz: Send + Sync {
    /// Start a continuous move. Velocities are clamped to [-1, 1].
    async fn ptz_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<()>;

    /// Stop all pan/tilt and zoom movement
    async fn ptz_stop(&self) -> Result<()>;
}

#[async_trait]
impl Ptz for OnvifCam {
    async fn ptz_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<()> {
        if !(pan.is_finite() && tilt.is_finite() && zoom.is_finite()) {
            return Err(OnvifError::ValidationError(format!(
                "PTZ velocity must be finite, got pan={} tilt={} zoom={}",
                pan, tilt, zoom
            )));
        }

        let token = self.profile_token().await?;
        let inner = continuous_move_body(&token, pan, tilt, zoom);
        self.request(Service::Ptz, "ContinuousMove", &inner).await?;
        debug!(pan, tilt, zoom, "continuous move started");
        Ok(())
    }

    async fn ptz_stop(&self) -> Result<()> {
        let token = self.profile_token().await?;
        let inner = stop_body(&token);
        self.request(Service::Ptz, "Stop", &inner).await?;
        debug!("movement stopped");
        Ok(())
    }
}

pub(crate) fn continuous_move_body(token: &str, pan: f32, tilt: f32, zoom: f32) -> String {
    format!(
        r#"<ProfileToken>{}</ProfileToken><Velocity><PanTilt xmlns="{ns}" x="{}" y="{}"/><Zoom xmlns="{ns}" x="{}"/></Velocity>"#,
        soap::escape(token),
        pan.clamp(-1.0, 1.0),
        tilt.clamp(-1.0, 1.0),
        zoom.clamp(-1.0, 1.0),
        ns = NS_SCHEMA
    )
}

pub(crate) fn stop_body(token: &str) -> String {
    format!(
        "<ProfileToken>{}</ProfileToken><PanTilt>true</PanTilt><Zoom>true</Zoom>",
        soap::escape(token)
    )
}
