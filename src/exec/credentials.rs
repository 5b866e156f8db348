// src/exec/credentials.rs

//! Run-as credential resolution.

use anyhow::Result;
use tokio::process::Command;

use crate::registry::RunAs;

/// Configure `cmd` to run as the user named in `run_as`.
///
/// The user is looked up in the system user database; the process gets that
/// user's uid and primary gid. `domain` and `password` have no meaning for
/// Unix process creation and are ignored.
#[cfg(unix)]
pub fn apply_run_as(cmd: &mut Command, run_as: &RunAs) -> Result<()> {
    use anyhow::{Context, anyhow};
    use nix::unistd::User;
    use tracing::debug;

    let user = User::from_name(&run_as.username)
        .with_context(|| format!("looking up user '{}'", run_as.username))?
        .ok_or_else(|| anyhow!("unknown user '{}'", run_as.username))?;

    if run_as.domain.is_some() || run_as.password.is_some() {
        debug!(
            user = %run_as.username,
            "run_as domain/password are ignored on this platform"
        );
    }

    cmd.uid(user.uid.as_raw());
    cmd.gid(user.gid.as_raw());
    Ok(())
}

#[cfg(not(unix))]
pub fn apply_run_as(_cmd: &mut Command, run_as: &RunAs) -> Result<()> {
    anyhow::bail!(
        "running as '{}' is not supported on this platform",
        run_as.username
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_is_rejected() {
        let mut cmd = Command::new("/bin/true");
        let run_as = RunAs {
            username: "procwarden-no-such-user-xyz".to_string(),
            ..RunAs::default()
        };
        let err = apply_run_as(&mut cmd, &run_as).unwrap_err();
        assert!(format!("{err:#}").contains("unknown user"));
    }

    #[test]
    fn root_resolves() {
        let mut cmd = Command::new("/bin/true");
        let run_as = RunAs {
            username: "root".to_string(),
            ..RunAs::default()
        };
        assert!(apply_run_as(&mut cmd, &run_as).is_ok());
    }
}
