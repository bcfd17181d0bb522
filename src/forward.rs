//! `adb forward` so a USB-attached phone is reachable on localhost.

use anyhow::{anyhow, bail, Context, Result};
use std::process::Command;

/// Arguments for mapping local `port` to the same port on the device.
pub fn forward_args(port: u16) -> Vec<String> {
    let spec = format!("tcp:{port}");
    vec!["forward".to_string(), spec.clone(), spec]
}

/// Hints shown when forwarding fails.
pub fn forward_hints(port: u16) -> Vec<String> {
    vec![
        "make sure only one Android device is attached".to_string(),
        format!("try it by hand: adb forward tcp:{port} tcp:{port}"),
        "check that USB debugging is enabled".to_string(),
    ]
}

pub fn setup_port_forward(port: u16) -> Result<()> {
    let output = Command::new("adb")
        .args(forward_args(port))
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!(
                    "adb not found; install Android SDK Platform Tools \
                     (https://developer.android.com/studio/releases/platform-tools)"
                )
            } else {
                anyhow!(e)
            }
        })
        .context("Failed to run adb")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("adb forward failed: {}", stderr.trim());
    }
    Ok(())
}
