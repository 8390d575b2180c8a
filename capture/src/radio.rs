//! Radio Controller (C1): puts the interface in monitor mode and switches
//! channels by shelling out to `ip`/`iw`, the same privileged calls the
//! reference implementation drove via `pyw`. Commands are injectable
//! through [`CommandRunner`] so the down/up/mode-set sequencing is testable
//! without touching a real network interface.

use std::process::Command;

use wifiology_common::{Result, WifiologyError};

pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<()>;
    fn is_monitor_mode(&self, interface: &str) -> Result<bool>;
}

pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let status = Command::new(cmd)
            .args(args)
            .status()
            .map_err(|e| WifiologyError::Radio(format!("failed to spawn `{cmd}`: {e}")))?;
        if !status.success() {
            return Err(WifiologyError::Radio(format!("`{cmd} {}` exited with {status}", args.join(" "))));
        }
        Ok(())
    }

    fn is_monitor_mode(&self, interface: &str) -> Result<bool> {
        let output = Command::new("iw")
            .args(["dev", interface, "info"])
            .output()
            .map_err(|e| WifiologyError::Radio(format!("failed to query `iw dev {interface} info`: {e}")))?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().any(|l| l.trim() == "type monitor"))
    }
}

pub struct RadioHandle<R: CommandRunner = SystemCommandRunner> {
    interface: String,
    runner: R,
}

impl RadioHandle<SystemCommandRunner> {
    pub fn acquire(interface: &str) -> Result<Self> {
        Self::acquire_with(interface, SystemCommandRunner)
    }
}

impl<R: CommandRunner> RadioHandle<R> {
    /// Brings the interface down, switches it to monitor mode, and brings it
    /// back up -- but only if it isn't already in monitor mode.
    pub fn acquire_with(interface: &str, runner: R) -> Result<Self> {
        if !runner.is_monitor_mode(interface)? {
            runner.run("ip", &["link", "set", interface, "down"])?;
            runner.run("iw", &["dev", interface, "set", "type", "monitor"])?;
            runner.run("ip", &["link", "set", interface, "up"])?;
        }
        Ok(RadioHandle { interface: interface.to_string(), runner })
    }

    /// Down, up, then set channel -- every time, unconditionally. Some
    /// drivers get stuck mid-scan unless the interface is bounced first.
    pub fn set_channel(&self, channel: u32) -> Result<()> {
        self.runner.run("ip", &["link", "set", &self.interface, "down"])?;
        self.runner.run("ip", &["link", "set", &self.interface, "up"])?;
        self.runner
            .run("iw", &["dev", &self.interface, "set", "channel", &channel.to_string()])
    }

    pub fn release(self) -> Result<()> {
        self.runner.run("ip", &["link", "set", &self.interface, "down"])
    }
}
