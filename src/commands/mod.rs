pub mod device;
pub mod imaging;
pub mod media;
pub mod ptz;

pub use device::{Capabilities, DeviceInfo, DeviceManagement};
pub use imaging::{Imaging, ImagingSettings, IrCutMode};
pub use media::{Media, MediaProfile, VideoSource};
pub use ptz::Ptz;
