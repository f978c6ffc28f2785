//! Input device enumeration via the cpal default host.
//!
//! cpal exposes no stable device identifiers, so the device name doubles as
//! the id handed to [`CpalInputCapture::with_device`](crate::CpalInputCapture::with_device).

use cpal::traits::{DeviceTrait, HostTrait};

use wav_recorder_core::models::audio_models::AudioSource;
use wav_recorder_core::models::error::CaptureError;

/// Audio device enumerator over the platform's default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List input devices, with the system default flagged.
    pub fn list_input_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        let default_name = self.default_input_device_name();
        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("failed to enumerate input devices: {}", e)))?;

        let mut sources = Vec::new();
        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("skipping input device without a name: {}", e);
                    continue;
                }
            };
            sources.push(AudioSource {
                is_default: default_name.as_deref() == Some(name.as_str()),
                id: name.clone(),
                name,
            });
        }
        Ok(sources)
    }

    /// Name of the system default input device, if there is one.
    pub fn default_input_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    /// Look up an input device by id, or the default device when `id` is `None`.
    pub fn find_input_device(&self, id: Option<&str>) -> Result<cpal::Device, CaptureError> {
        match id {
            None => self
                .host
                .default_input_device()
                .ok_or(CaptureError::DeviceNotAvailable),
            Some(id) => {
                let mut devices = self.host.input_devices().map_err(|e| {
                    CaptureError::Device(format!("failed to enumerate input devices: {}", e))
                })?;
                devices
                    .find(|d| d.name().map(|name| name == id).unwrap_or(false))
                    .ok_or(CaptureError::DeviceNotAvailable)
            }
        }
    }
}
