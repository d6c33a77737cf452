//! Device bridge: the host-side collaborator behind the automation
//! builtins. `AdbClient` drives the `adb` binary through subprocesses;
//! anything implementing [`DeviceBridge`] can stand in for it.

use std::fmt;
use std::fs;
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BridgeError {
    pub message: String,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl DeviceInfo {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

pub trait DeviceBridge {
    fn list_devices(&self) -> BridgeResult<Vec<DeviceInfo>>;
    fn model(&self, serial: &str) -> BridgeResult<String>;
    fn android_version(&self, serial: &str) -> BridgeResult<String>;
    fn screen_size(&self, serial: &str) -> BridgeResult<(i64, i64)>;

    fn tap(&self, serial: &str, x: i64, y: i64) -> BridgeResult<()>;
    fn swipe(
        &self,
        serial: &str,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        duration_ms: i64,
    ) -> BridgeResult<()>;
    fn input_text(&self, serial: &str, text: &str) -> BridgeResult<()>;
    fn key_event(&self, serial: &str, keycode: &str) -> BridgeResult<()>;
    fn screenshot(&self, serial: &str, output_path: &str) -> BridgeResult<()>;

    fn launch_app(&self, serial: &str, package: &str) -> BridgeResult<()>;
    fn stop_app(&self, serial: &str, package: &str) -> BridgeResult<()>;
    fn install_app(&self, serial: &str, apk_path: &str) -> BridgeResult<()>;
    fn uninstall_app(&self, serial: &str, package: &str) -> BridgeResult<()>;
    fn clear_app_data(&self, serial: &str, package: &str) -> BridgeResult<()>;

    fn push_file(&self, serial: &str, local_path: &str, remote_path: &str) -> BridgeResult<()>;
    fn pull_file(&self, serial: &str, remote_path: &str, local_path: &str) -> BridgeResult<()>;

    fn device_exists(&self, serial: &str) -> BridgeResult<bool> {
        Ok(self
            .list_devices()?
            .iter()
            .any(|device| device.serial == serial))
    }
}

/// Bridge backed by the `adb` binary found on `PATH` (or a configured
/// path). One subprocess per operation; a non-zero exit becomes the
/// operation's error message.
pub struct AdbClient {
    adb_path: String,
}

impl AdbClient {
    pub fn new() -> Self {
        Self::with_path(std::env::var("ADB").unwrap_or_else(|_| "adb".to_string()))
    }

    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    fn run(&self, args: &[&str]) -> BridgeResult<String> {
        let output = Command::new(&self.adb_path)
            .args(args)
            .output()
            .map_err(|error| BridgeError::new(format!("Cannot run adb: {error}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(BridgeError::new(if detail.is_empty() {
                format!("adb {} failed", args.first().copied().unwrap_or_default())
            } else {
                detail.to_string()
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_binary(&self, args: &[&str]) -> BridgeResult<Vec<u8>> {
        let output = Command::new(&self.adb_path)
            .args(args)
            .output()
            .map_err(|error| BridgeError::new(format!("Cannot run adb: {error}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BridgeError::new(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    fn shell(&self, serial: &str, command: &[&str]) -> BridgeResult<String> {
        let mut args = vec!["-s", serial, "shell"];
        args.extend_from_slice(command);
        self.run(&args)
    }

    fn getprop(&self, serial: &str, property: &str) -> BridgeResult<String> {
        Ok(self
            .shell(serial, &["getprop", property])?
            .trim()
            .to_string())
    }
}

impl Default for AdbClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdbClient")
            .field("adb_path", &self.adb_path)
            .finish()
    }
}

impl DeviceBridge for AdbClient {
    fn list_devices(&self) -> BridgeResult<Vec<DeviceInfo>> {
        let output = self.run(&["devices"])?;
        Ok(parse_device_list(&output))
    }

    fn model(&self, serial: &str) -> BridgeResult<String> {
        self.getprop(serial, "ro.product.model")
    }

    fn android_version(&self, serial: &str) -> BridgeResult<String> {
        self.getprop(serial, "ro.build.version.release")
    }

    fn screen_size(&self, serial: &str) -> BridgeResult<(i64, i64)> {
        let output = self.shell(serial, &["wm", "size"])?;
        parse_screen_size(&output)
            .ok_or_else(|| BridgeError::new(format!("Cannot parse screen size: {}", output.trim())))
    }

    fn tap(&self, serial: &str, x: i64, y: i64) -> BridgeResult<()> {
        self.shell(serial, &["input", "tap", &x.to_string(), &y.to_string()])?;
        Ok(())
    }

    fn swipe(
        &self,
        serial: &str,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        duration_ms: i64,
    ) -> BridgeResult<()> {
        self.shell(
            serial,
            &[
                "input",
                "swipe",
                &x1.to_string(),
                &y1.to_string(),
                &x2.to_string(),
                &y2.to_string(),
                &duration_ms.to_string(),
            ],
        )?;
        Ok(())
    }

    fn input_text(&self, serial: &str, text: &str) -> BridgeResult<()> {
        // `adb shell input text` treats spaces as argument separators.
        let escaped = text.replace(' ', "%s");
        self.shell(serial, &["input", "text", &escaped])?;
        Ok(())
    }

    fn key_event(&self, serial: &str, keycode: &str) -> BridgeResult<()> {
        self.shell(serial, &["input", "keyevent", keycode])?;
        Ok(())
    }

    fn screenshot(&self, serial: &str, output_path: &str) -> BridgeResult<()> {
        let bytes = self.run_binary(&["-s", serial, "exec-out", "screencap", "-p"])?;
        fs::write(output_path, bytes)
            .map_err(|error| BridgeError::new(format!("Cannot write {output_path}: {error}")))
    }

    fn launch_app(&self, serial: &str, package: &str) -> BridgeResult<()> {
        self.shell(
            serial,
            &[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ],
        )?;
        Ok(())
    }

    fn stop_app(&self, serial: &str, package: &str) -> BridgeResult<()> {
        self.shell(serial, &["am", "force-stop", package])?;
        Ok(())
    }

    fn install_app(&self, serial: &str, apk_path: &str) -> BridgeResult<()> {
        self.run(&["-s", serial, "install", "-r", apk_path])?;
        Ok(())
    }

    fn uninstall_app(&self, serial: &str, package: &str) -> BridgeResult<()> {
        self.run(&["-s", serial, "uninstall", package])?;
        Ok(())
    }

    fn clear_app_data(&self, serial: &str, package: &str) -> BridgeResult<()> {
        self.shell(serial, &["pm", "clear", package])?;
        Ok(())
    }

    fn push_file(&self, serial: &str, local_path: &str, remote_path: &str) -> BridgeResult<()> {
        self.run(&["-s", serial, "push", local_path, remote_path])?;
        Ok(())
    }

    fn pull_file(&self, serial: &str, remote_path: &str, local_path: &str) -> BridgeResult<()> {
        self.run(&["-s", serial, "pull", remote_path, local_path])?;
        Ok(())
    }
}

/// Parses `adb devices` output: a banner line, then `<serial>\t<state>`.
fn parse_device_list(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(DeviceInfo {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Parses `wm size` output such as `Physical size: 1080x2400`.
fn parse_screen_size(output: &str) -> Option<(i64, i64)> {
    let dimensions = output.lines().find_map(|line| {
        let (_, rest) = line.split_once("size:")?;
        Some(rest.trim())
    })?;
    let (width, height) = dimensions.split_once('x')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}
