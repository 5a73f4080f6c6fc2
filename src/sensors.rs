use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SensorPaths;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Axes {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Battery {
    pub percent: u8,
    pub charging: bool,
}

/// Point-in-time reading of every channel. `battery` is `None` when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub lid_angle_degrees: i32,
    pub base_illuminance: i32,
    pub display_illuminance: i32,
    pub base_gyro: Axes,
    pub base_accel: Axes,
    pub display_accel: Axes,
    pub battery: Option<Battery>,
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor channel {0} unavailable")]
    Unavailable(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unparsable value {value:?} in {path}")]
    Parse { path: PathBuf, value: String },
}

/// Source of sensor snapshots.
///
/// `read` may block on slow I/O; callers run it on the blocking pool. Channels
/// that fail to read are reported as 0 and the battery as unknown.
pub trait SensorProvider: Send + Sync {
    fn read(&self) -> SensorSnapshot;
}

/// Provider returning the same snapshot every time.
#[derive(Debug, Clone, Default)]
pub struct FixedSensors(pub SensorSnapshot);

impl SensorProvider for FixedSensors {
    fn read(&self) -> SensorSnapshot {
        self.0
    }
}

const LID_ANGLE: &str = "cros-ec-lid-angle";
const BASE_GYRO: &str = "cros-ec-gyro accel-base";
const BASE_ACCEL: &str = "cros-ec-accel accel-base";
const DISPLAY_ACCEL: &str = "cros-ec-accel accel-display";
const BASE_LIGHT: &str = "cros-ec-light accel-base";
const DISPLAY_LIGHT: &str = "cros-ec-light accel-display";

/// Linux IIO (ChromeOS EC) sensors plus the sysfs battery.
///
/// Device directories are resolved once at construction; the channel files
/// themselves are reopened on every read so concurrent readers share nothing.
#[derive(Debug, Clone)]
pub struct IioSensors {
    lid_angle: Option<PathBuf>,
    base_gyro: Option<PathBuf>,
    base_accel: Option<PathBuf>,
    display_accel: Option<PathBuf>,
    base_light: Option<PathBuf>,
    display_light: Option<PathBuf>,
    battery_dir: PathBuf,
}

impl IioSensors {
    pub fn discover(paths: &SensorPaths) -> Self {
        let devices = match list_devices(&paths.iio_root) {
            Ok(devices) => devices,
            Err(e) => {
                warn!(root = %paths.iio_root.display(), error = %e, "cannot enumerate IIO devices");
                Vec::new()
            }
        };

        let find = |identity: &str| {
            let found = devices
                .iter()
                .find(|(id, _)| id == identity)
                .map(|(_, dir)| dir.clone());
            match &found {
                Some(dir) => info!(device = identity, path = %dir.display(), "sensor found"),
                None => warn!(device = identity, "sensor missing, reporting zeros"),
            }
            found
        };

        Self {
            lid_angle: find(LID_ANGLE),
            base_gyro: find(BASE_GYRO),
            base_accel: find(BASE_ACCEL),
            display_accel: find(DISPLAY_ACCEL),
            base_light: find(BASE_LIGHT),
            display_light: find(DISPLAY_LIGHT),
            battery_dir: paths.battery_dir.clone(),
        }
    }

    fn channel(&self, device: &Option<PathBuf>, name: &str, file: &str) -> i32 {
        let result = match device {
            Some(dir) => read_value(&dir.join(file)),
            None => Err(SensorError::Unavailable(name.to_string())),
        };
        result.unwrap_or_else(|e| {
            debug!(channel = name, error = %e, "sensor read failed");
            0
        })
    }

    fn axes(&self, device: &Option<PathBuf>, name: &str, prefix: &str) -> Axes {
        Axes {
            x: self.channel(device, name, &format!("{prefix}_x_raw")),
            y: self.channel(device, name, &format!("{prefix}_y_raw")),
            z: self.channel(device, name, &format!("{prefix}_z_raw")),
        }
    }

    fn battery(&self) -> Result<Battery, SensorError> {
        let percent = read_value(&self.battery_dir.join("capacity"))?.clamp(0, 100) as u8;
        let status_path = self.battery_dir.join("status");
        let status = fs::read_to_string(&status_path).map_err(|source| SensorError::Io {
            path: status_path,
            source,
        })?;
        Ok(Battery {
            percent,
            charging: status.trim() == "Charging",
        })
    }
}

impl SensorProvider for IioSensors {
    fn read(&self) -> SensorSnapshot {
        SensorSnapshot {
            lid_angle_degrees: self.channel(&self.lid_angle, LID_ANGLE, "in_angl_raw"),
            base_illuminance: self.channel(&self.base_light, BASE_LIGHT, "in_illuminance_input"),
            display_illuminance: self.channel(
                &self.display_light,
                DISPLAY_LIGHT,
                "in_illuminance_input",
            ),
            base_gyro: self.axes(&self.base_gyro, BASE_GYRO, "in_anglvel"),
            base_accel: self.axes(&self.base_accel, BASE_ACCEL, "in_accel"),
            display_accel: self.axes(&self.display_accel, DISPLAY_ACCEL, "in_accel"),
            battery: self
                .battery()
                .map_err(|e| debug!(error = %e, "battery unknown"))
                .ok(),
        }
    }
}

/// Lists `(identity, dir)` for every `iio:device*` under `root`, where the
/// identity is `"<name> <label>"` or just `"<name>"` when no label exists.
fn list_devices(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut devices = Vec::new();
    for entry in fs::read_dir(root)? {
        let dir = entry?.path();
        let is_device = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("iio:device"));
        if !is_device {
            continue;
        }
        let Ok(name) = fs::read_to_string(dir.join("name")) else {
            continue;
        };
        let identity = match fs::read_to_string(dir.join("label")) {
            Ok(label) if !label.trim().is_empty() => format!("{} {}", name.trim(), label.trim()),
            _ => name.trim().to_string(),
        };
        devices.push((identity, dir));
    }
    devices.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(devices)
}

/// Reads an integer sysfs attribute. Empty files read as 0; fractional values
/// are truncated.
fn read_value(path: &Path) -> Result<i32, SensorError> {
    let raw = fs::read_to_string(path).map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value = raw.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse::<i32>()
        .or_else(|_| value.parse::<f64>().map(|v| v as i32))
        .map_err(|_| SensorError::Parse {
            path: path.to_path_buf(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn device(root: &Path, index: usize, name: &str, label: Option<&str>, files: &[(&str, &str)]) {
        let dir = root.join(format!("iio:device{index}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{name}\n")).unwrap();
        if let Some(label) = label {
            fs::write(dir.join("label"), format!("{label}\n")).unwrap();
        }
        for (file, value) in files {
            fs::write(dir.join(file), value).unwrap();
        }
    }

    fn fake_tree() -> (TempDir, SensorPaths) {
        let tmp = TempDir::new().unwrap();
        let iio = tmp.path().join("iio");
        let bat = tmp.path().join("BAT0");
        fs::create_dir_all(&bat).unwrap();

        device(&iio, 0, "cros-ec-lid-angle", None, &[("in_angl_raw", "180\n")]);
        device(
            &iio,
            1,
            "cros-ec-accel",
            Some("accel-base"),
            &[("in_accel_x_raw", "10\n"), ("in_accel_y_raw", "-20\n"), ("in_accel_z_raw", "30\n")],
        );
        device(
            &iio,
            2,
            "cros-ec-gyro",
            Some("accel-base"),
            &[("in_anglvel_x_raw", "1\n"), ("in_anglvel_y_raw", "2\n"), ("in_anglvel_z_raw", "")],
        );
        device(&iio, 3, "cros-ec-light", Some("accel-display"), &[("in_illuminance_input", "42.7\n")]);
        device(&iio, 4, "cros-ec-light", Some("accel-base"), &[("in_illuminance_input", "junk\n")]);
        fs::write(bat.join("capacity"), "87\n").unwrap();
        fs::write(bat.join("status"), "Charging\n").unwrap();

        let paths = SensorPaths {
            iio_root: iio,
            battery_dir: bat,
        };
        (tmp, paths)
    }

    #[test]
    fn reads_discovered_channels() {
        let (_tmp, paths) = fake_tree();
        let snapshot = IioSensors::discover(&paths).read();

        assert_eq!(snapshot.lid_angle_degrees, 180);
        assert_eq!(snapshot.base_accel, Axes { x: 10, y: -20, z: 30 });
        assert_eq!(snapshot.base_gyro, Axes { x: 1, y: 2, z: 0 });
        assert_eq!(snapshot.display_illuminance, 42);
        assert_eq!(
            snapshot.battery,
            Some(Battery { percent: 87, charging: true })
        );
    }

    #[test]
    fn missing_channels_default_to_zero() {
        let (_tmp, paths) = fake_tree();
        let snapshot = IioSensors::discover(&paths).read();

        // No display accelerometer; base light holds junk
        assert_eq!(snapshot.display_accel, Axes::default());
        assert_eq!(snapshot.base_illuminance, 0);
    }

    #[test]
    fn missing_battery_is_unknown() {
        let (tmp, mut paths) = fake_tree();
        paths.battery_dir = tmp.path().join("nope");
        assert_eq!(IioSensors::discover(&paths).read().battery, None);
    }

    #[test]
    fn missing_root_still_builds_provider() {
        let paths = SensorPaths {
            iio_root: PathBuf::from("/definitely/not/here"),
            battery_dir: PathBuf::from("/definitely/not/here"),
        };
        assert_eq!(IioSensors::discover(&paths).read(), SensorSnapshot::default());
    }
}
