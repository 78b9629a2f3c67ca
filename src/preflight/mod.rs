//! Host setup checks run before staging.
//!
//! Staging refuses to start when the host is missing the emulator support
//! package, because the staged tree is useless without it.
//!
//! # Example
//!
//! ```rust,ignore
//! use artifact_stager::preflight::{check_host_setup, REQUIRED_TOOLS};
//! use artifact_stager::process::SystemRunner;
//!
//! let report = check_host_setup(&SystemRunner, "cuttlefish-common", REQUIRED_TOOLS);
//! if !report.setup_ok() {
//!     eprintln!("{}", report.describe());
//! }
//! ```

use tracing::debug;

use crate::process::{ProcessRunner, ToolCommand};

/// Host tools the stager shells out to.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("unzip", "unzip"), ("setfacl", "acl")];

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

fn missing_tools<'t>(tools: &[(&'t str, &'t str)]) -> Vec<(&'t str, &'t str)> {
    tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .copied()
        .collect()
}

/// Check whether a Debian package is installed.
pub fn package_installed(runner: &dyn ProcessRunner, package: &str) -> bool {
    let cmd = ToolCommand::new("dpkg-query")
        .arg("-W")
        .arg("-f=${Status}")
        .arg(package);
    let installed = runner
        .output(&cmd)
        .map(|status| status.contains("install ok installed"))
        .unwrap_or(false);
    debug!(package, installed, "package check");
    installed
}

/// Result of [`check_host_setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub package: String,
    pub package_installed: bool,
    pub missing_tools: Vec<(String, String)>,
}

impl SetupReport {
    /// Whether staging may proceed. Only the support package is mandatory;
    /// missing tools surface later as tool failures.
    pub fn setup_ok(&self) -> bool {
        self.package_installed
    }

    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if self.package_installed {
            lines.push(format!("package {}: installed", self.package));
        } else {
            lines.push(format!("package {}: NOT installed", self.package));
        }
        for (tool, package) in &self.missing_tools {
            lines.push(format!("tool {}: missing (install: {})", tool, package));
        }
        lines.join("\n")
    }
}

pub fn check_host_setup(
    runner: &dyn ProcessRunner,
    package: &str,
    tools: &[(&str, &str)],
) -> SetupReport {
    SetupReport {
        package: package.to_string(),
        package_installed: package_installed(runner, package),
        missing_tools: missing_tools(tools)
            .into_iter()
            .map(|(t, p)| (t.to_string(), p.to_string()))
            .collect(),
    }
}
