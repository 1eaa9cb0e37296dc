//! Device-control collaborator boundary.
//!
//! Everything the core needs from the device side that does not travel
//! over the control channel goes through [`DeviceControl`]: component
//! launches and the process management the operator shell performs before
//! a session can connect. [`AdbDevice`] implements it by shelling out to
//! `adb`.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use tracing::debug;

use crate::error::DeviceError;

/// Operations delegated to the device controller.
///
/// Opaque to the core beyond their names and that they may fail.
pub trait DeviceControl: Send + Sync {
    /// Installs an application package on the device.
    fn install_application(&self, apk: &Path) -> Result<(), DeviceError>;

    /// Launches an activity by fully qualified component name.
    fn start_activity(&self, component: &str) -> Result<(), DeviceError>;

    /// Starts a service by fully qualified component name.
    fn start_service(&self, component: &str) -> Result<(), DeviceError>;

    /// Blocks until the device has finished booting.
    fn wait_for_boot(&self) -> Result<(), DeviceError>;

    /// Forwards a local TCP port to the device.
    fn forward_port(&self, local: u16, remote: u16) -> Result<(), DeviceError>;

    /// Kills a running emulator instance.
    fn kill_emulator(&self) -> Result<(), DeviceError>;
}

/// Shell snippet polling `dev.bootcomplete` until the device is up.
const BOOT_WAIT: &str = r#"while [ "$(getprop dev.bootcomplete)" != "1" ] ; do sleep 1; done"#;

/// `adb`-backed device controller.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_command: String,
}

impl AdbDevice {
    /// Creates a controller using the given `adb` executable.
    #[must_use]
    pub fn new(adb_command: impl Into<String>) -> Self {
        Self {
            adb_command: adb_command.into(),
        }
    }

    /// Runs one adb invocation and returns its stdout.
    fn run(&self, args: &[&str]) -> Result<String, DeviceError> {
        let rendered = format!("{} {}", self.adb_command, args.join(" "));
        debug!(command = %rendered, "running adb");

        let output = Command::new(&self.adb_command)
            .args(args)
            .output()
            .map_err(|e| DeviceError::Spawn {
                command: rendered.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DeviceError::CommandFailed {
                command: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| DeviceError::UnexpectedOutput {
            message: format!("non-UTF-8 output from {rendered}"),
        })
    }
}

impl DeviceControl for AdbDevice {
    fn install_application(&self, apk: &Path) -> Result<(), DeviceError> {
        let apk = apk.to_string_lossy();
        self.run(&["install", apk.as_ref()]).map(|_| ())
    }

    fn start_activity(&self, component: &str) -> Result<(), DeviceError> {
        self.run(&["shell", "am", "start", "-W", "-n", component])
            .map(|_| ())
    }

    fn start_service(&self, component: &str) -> Result<(), DeviceError> {
        self.run(&["shell", "am", "startservice", "-n", component])
            .map(|_| ())
    }

    fn wait_for_boot(&self) -> Result<(), DeviceError> {
        self.run(&["wait-for-device", "shell", BOOT_WAIT]).map(|_| ())
    }

    fn forward_port(&self, local: u16, remote: u16) -> Result<(), DeviceError> {
        self.run(&["forward", &format!("tcp:{local}"), &format!("tcp:{remote}")])
            .map(|_| ())
    }

    fn kill_emulator(&self) -> Result<(), DeviceError> {
        self.run(&["emu", "kill"]).map(|_| ())
    }
}

/// Device controller that records invocations instead of touching a
/// device. Used by tests and demos.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Mutex<Vec<String>>,
}

impl RecordingDevice {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded invocations, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl DeviceControl for RecordingDevice {
    fn install_application(&self, apk: &Path) -> Result<(), DeviceError> {
        self.record(format!("install {}", apk.display()));
        Ok(())
    }

    fn start_activity(&self, component: &str) -> Result<(), DeviceError> {
        self.record(format!("start-activity {component}"));
        Ok(())
    }

    fn start_service(&self, component: &str) -> Result<(), DeviceError> {
        self.record(format!("start-service {component}"));
        Ok(())
    }

    fn wait_for_boot(&self) -> Result<(), DeviceError> {
        self.record("wait-for-boot".to_string());
        Ok(())
    }

    fn forward_port(&self, local: u16, remote: u16) -> Result<(), DeviceError> {
        self.record(format!("forward {local} {remote}"));
        Ok(())
    }

    fn kill_emulator(&self) -> Result<(), DeviceError> {
        self.record("kill-emulator".to_string());
        Ok(())
    }
}
