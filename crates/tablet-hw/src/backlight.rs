//! sysfs backlight adapter (`/sys/class/backlight/<name>`).
//!
//! Brightness percent is scaled against `max_brightness`. Panel power goes
//! through `bl_power` (0 = on, 4 = powerdown, the FB_BLANK values).

use crate::display::{Display, DisplayError};
use std::path::{Path, PathBuf};

const BACKLIGHT_CLASS: &str = "/sys/class/backlight";
const BL_POWER_ON: &str = "0";
const BL_POWER_OFF: &str = "4";

/// A sysfs backlight device.
#[derive(Debug)]
pub struct Backlight {
    dir: PathBuf,
    max_brightness: u32,
}

impl Backlight {
    /// Open `/sys/class/backlight/<name>`.
    pub fn open(name: &str) -> Result<Self, DisplayError> {
        Self::at(Path::new(BACKLIGHT_CLASS).join(name))
    }

    /// Open the first backlight device in sysfs.
    pub fn discover() -> Result<Self, DisplayError> {
        let first = list_in(Path::new(BACKLIGHT_CLASS))
            .into_iter()
            .next()
            .ok_or_else(|| DisplayError::NoBacklight(PathBuf::from(BACKLIGHT_CLASS)))?;
        Self::open(&first)
    }

    /// Open a backlight directory directly.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, DisplayError> {
        let dir = dir.into();
        let max_brightness = read_u32(&dir.join("max_brightness"))?;
        if max_brightness == 0 {
            return Err(DisplayError::Malformed {
                path: dir.join("max_brightness"),
                contents: "0".into(),
            });
        }
        tracing::info!(dir = %dir.display(), max_brightness, "backlight opened");
        Ok(Self { dir, max_brightness })
    }

    /// Current brightness in percent.
    pub fn read_brightness(&self) -> Result<u8, DisplayError> {
        let raw = read_u32(&self.dir.join("brightness"))?;
        Ok(raw_to_percent(raw, self.max_brightness))
    }

    /// Names of all backlight devices in sysfs.
    pub fn list() -> Vec<String> {
        list_in(Path::new(BACKLIGHT_CLASS))
    }

    fn write(&self, file: &str, value: &str) -> Result<(), DisplayError> {
        let path = self.dir.join(file);
        std::fs::write(&path, value).map_err(|source| DisplayError::Io { path, source })
    }
}

impl Display for Backlight {
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        let raw = percent_to_raw(level, self.max_brightness);
        tracing::debug!(level, raw, "backlight brightness");
        self.write("brightness", &raw.to_string())
    }

    fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
        tracing::debug!(on, "backlight power");
        self.write("bl_power", if on { BL_POWER_ON } else { BL_POWER_OFF })
    }

    fn name(&self) -> String {
        self.dir.display().to_string()
    }
}

fn list_in(class_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(class_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

fn read_u32(path: &Path) -> Result<u32, DisplayError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DisplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    contents
        .trim()
        .parse()
        .map_err(|_| DisplayError::Malformed {
            path: path.to_path_buf(),
            contents: contents.trim().to_string(),
        })
}

fn percent_to_raw(level: u8, max: u32) -> u32 {
    let level = level.min(100) as u64;
    ((level * max as u64 + 50) / 100) as u32
}

fn raw_to_percent(raw: u32, max: u32) -> u8 {
    let raw = raw.min(max) as u64;
    ((raw * 100 + max as u64 / 2) / max as u64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake sysfs backlight directory under the system temp dir.
    fn fake_backlight(name: &str, max: u32, current: u32) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tablet-hw-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("max_brightness"), format!("{max}\n")).unwrap();
        std::fs::write(dir.join("brightness"), format!("{current}\n")).unwrap();
        std::fs::write(dir.join("bl_power"), "0\n").unwrap();
        dir
    }

    fn read(dir: &Path, file: &str) -> String {
        std::fs::read_to_string(dir.join(file)).unwrap()
    }

    #[test]
    fn test_percent_scaling() {
        assert_eq!(percent_to_raw(0, 255), 0);
        assert_eq!(percent_to_raw(50, 255), 128);
        assert_eq!(percent_to_raw(100, 255), 255);
        assert_eq!(percent_to_raw(200, 255), 255);
        assert_eq!(percent_to_raw(20, 96000), 19200);
        assert_eq!(raw_to_percent(128, 255), 50);
        assert_eq!(raw_to_percent(9999, 255), 100);
    }

    #[test]
    fn test_set_brightness_writes_raw_value() {
        let dir = fake_backlight("brightness", 1000, 1000);
        let mut backlight = Backlight::at(&dir).unwrap();
        backlight.set_brightness(35).unwrap();
        assert_eq!(read(&dir, "brightness"), "350");
        assert_eq!(backlight.read_brightness().unwrap(), 35);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_set_power_writes_bl_power() {
        let dir = fake_backlight("power", 255, 100);
        let mut backlight = Backlight::at(&dir).unwrap();
        backlight.set_power(false).unwrap();
        assert_eq!(read(&dir, "bl_power"), "4");
        backlight.set_power(true).unwrap();
        assert_eq!(read(&dir, "bl_power"), "0");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_zero_or_garbage_max() {
        let dir = fake_backlight("zero-max", 0, 0);
        assert!(matches!(
            Backlight::at(&dir),
            Err(DisplayError::Malformed { .. })
        ));
        std::fs::write(dir.join("max_brightness"), "lots").unwrap();
        assert!(matches!(
            Backlight::at(&dir),
            Err(DisplayError::Malformed { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        assert!(matches!(
            Backlight::at("/nonexistent/backlight"),
            Err(DisplayError::Io { .. })
        ));
    }

    #[test]
    fn test_list_in_sorted() {
        let class = std::env::temp_dir().join(format!("tablet-hw-{}-class", std::process::id()));
        let _ = std::fs::remove_dir_all(&class);
        std::fs::create_dir_all(class.join("intel_backlight")).unwrap();
        std::fs::create_dir_all(class.join("acpi_video0")).unwrap();
        assert_eq!(list_in(&class), vec!["acpi_video0", "intel_backlight"]);
        assert!(list_in(Path::new("/nonexistent/class")).is_empty());
        std::fs::remove_dir_all(&class).unwrap();
    }
}
