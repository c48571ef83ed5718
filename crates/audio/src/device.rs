use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub fn list_input_devices() -> crate::Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let is_default = default_name.as_ref() == Some(&name);
        devices.push(AudioDevice {
            id: name.clone(),
            name,
            is_default,
        });
    }
    Ok(devices)
}

pub fn list_output_devices() -> crate::Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.output_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let is_default = default_name.as_ref() == Some(&name);
        devices.push(AudioDevice {
            id: name.clone(),
            name,
            is_default,
        });
    }
    Ok(devices)
}

pub fn get_default_input_device() -> crate::Result<Option<AudioDevice>> {
    let host = cpal::default_host();
    Ok(host.default_input_device().map(|device| AudioDevice {
        id: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        is_default: true,
    }))
}

pub fn get_default_output_device() -> crate::Result<Option<AudioDevice>> {
    let host = cpal::default_host();
    Ok(host.default_output_device().map(|device| AudioDevice {
        id: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        is_default: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_input_devices_does_not_error() {
        let devices = list_input_devices().unwrap();
        println!("found {} input devices", devices.len());
    }
}
