pub mod commands;
pub mod constants;
pub mod error;
pub mod onvif;
pub mod soap;
pub mod stream;

pub use commands::*;
pub use error::{OnvifError, Result};
pub use onvif::OnvifCam;
pub use stream::{Credentials, Frame, StreamEvent, VideoStream};
