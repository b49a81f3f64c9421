use std::path::Path;
use tokio::process::Command;
use tracing::debug;
use waffle_core::{cancellable, CancellationToken, Error, Result, Sentinel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner { Terraform, Tofu }

impl Runner {
    pub fn bin(self) -> &'static str {
        match self { Runner::Terraform => "terraform", Runner::Tofu => "tofu" }
    }
}

/// Terraform wins when both are installed; plans are usually produced by it.
pub fn pick_runner(prefer: Option<Runner>) -> Result<Runner> {
    if let Some(p) = prefer { return Ok(p); }
    if which::which("terraform").is_ok() { Ok(Runner::Terraform) }
    else if which::which("tofu").is_ok() { Ok(Runner::Tofu) }
    else { Err(Error::Message("neither 'terraform' nor 'tofu' found in PATH".into())) }
}

/// Renders a binary plan file to JSON with `<runner> show -json`, run from
/// `working_dir` so the initialized providers are found.
pub async fn show_json(r: Runner, plan: &Path, working_dir: &Path, cancel: &CancellationToken) -> Result<Vec<u8>> {
    debug!(runner = r.bin(), plan = %plan.display(), "rendering binary plan");
    let out = cancellable(cancel, async {
        Command::new(r.bin())
            .arg("show")
            .arg("-json")
            .arg(plan)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(Error::from)
    })
    .await
    .map_err(|e| match e {
        Error::Cancelled => e,
        other => Error::file(plan, format!("{} show", r.bin()), other),
    })?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        return Err(Error::parsing(
            plan.display().to_string(),
            format!("{} show -json exited with {}: {stderr}", r.bin(), out.status),
            Error::from(Sentinel::InvalidPlanFile),
        ));
    }
    Ok(out.stdout)
}
