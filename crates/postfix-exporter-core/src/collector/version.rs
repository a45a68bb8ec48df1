use std::path::Path;
use std::process::Command;

use tracing::debug;

/// Postfix version from `postconf [-c dir] -h mail_version`.
pub fn discover_version(postconf: &Path, config_dir: Option<&Path>) -> Option<String> {
    let mut cmd = Command::new(postconf);
    if let Some(dir) = config_dir {
        cmd.arg("-c").arg(dir);
    }
    cmd.args(["-h", "mail_version"]);

    let output = match cmd.output() {
        Ok(out) => out,
        Err(e) => {
            debug!(postconf = %postconf.display(), error = %e, "postconf not runnable");
            return None;
        }
    };
    if !output.status.success() {
        debug!(status = %output.status, "postconf failed");
        return None;
    }

    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
