//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nix::unistd::{Gid, Group, Uid, User, setegid, seteuid};
use tracing::{error, trace};

/// Exit code reserved for privilege-drop failures, so the supervisor can
/// distinguish them from generic errors.
pub const EXIT_PRIVILEGE_FAILURE: i32 = 4;

/// A serious seteuid/setegid failure. Only `main` should handle this, as
/// part of a graceful program termination.
#[derive(Debug)]
pub struct PrivilegeError(String);

/// Switches the process between its privileged identity and the
/// unprivileged identity named in the `general` configuration section.
///
/// Only the effective IDs are changed, so privileges can be temporarily
/// re-acquired through [`PrivilegeHelper::run_elevated`].
#[derive(Debug)]
pub struct PrivilegeHelper {
    normal_uid: Uid,
    normal_gid: Gid,
    privileged_uid: Uid,
    privileged_gid: Gid,
}

// Restores the unprivileged identity when the elevated scope ends, even
// on an early return or unwind.
struct ElevationGuard<'a>(&'a PrivilegeHelper);

// ===== impl PrivilegeError =====

impl std::fmt::Display for PrivilegeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PrivilegeError {}

// ===== impl PrivilegeHelper =====

impl PrivilegeHelper {
    /// Resolves the identity to drop to. With neither a user nor a group
    /// configured, dropping is a no-op.
    pub fn initialize(
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<PrivilegeHelper, PrivilegeError> {
        trace!(?user, ?group, "initializing privilege helper");
        let mut helper = PrivilegeHelper {
            normal_uid: Uid::effective(),
            normal_gid: Gid::effective(),
            privileged_uid: Uid::effective(),
            privileged_gid: Gid::effective(),
        };

        if let Some(group) = group {
            let resolved = Group::from_name(group)
                .map_err(|errno| {
                    PrivilegeError(format!(
                        "failed to look up group \"{group}\": {errno}"
                    ))
                })?
                .ok_or_else(|| {
                    PrivilegeError(format!(
                        "failed to get gid for \"{group}\""
                    ))
                })?;
            helper.normal_gid = resolved.gid;
        }

        if let Some(user) = user {
            let resolved = User::from_name(user)
                .map_err(|errno| {
                    PrivilegeError(format!(
                        "failed to look up user \"{user}\": {errno}"
                    ))
                })?
                .ok_or_else(|| {
                    PrivilegeError(format!("failed to get uid for \"{user}\""))
                })?;
            helper.normal_uid = resolved.uid;
        }

        Ok(helper)
    }

    /// Switches to the unprivileged identity.
    pub fn drop_privileges(&self) -> Result<(), PrivilegeError> {
        setegid(self.normal_gid).map_err(|errno| {
            PrivilegeError(format!(
                "failed to drop to effective gid {}: {errno}",
                self.normal_gid
            ))
        })?;
        seteuid(self.normal_uid).map_err(|errno| {
            PrivilegeError(format!(
                "failed to drop to effective uid {}: {errno}",
                self.normal_uid
            ))
        })?;
        trace!(uid = %self.normal_uid, gid = %self.normal_gid, "dropped privileges");
        Ok(())
    }

    fn raise(&self) -> Result<(), PrivilegeError> {
        seteuid(self.privileged_uid).map_err(|errno| {
            PrivilegeError(format!(
                "failed to elevate to effective uid {}: {errno}",
                self.privileged_uid
            ))
        })?;
        setegid(self.privileged_gid).map_err(|errno| {
            PrivilegeError(format!(
                "failed to elevate to effective gid {}: {errno}",
                self.privileged_gid
            ))
        })?;
        Ok(())
    }

    /// Runs `f` with the privileged identity, restoring the unprivileged
    /// one afterwards regardless of how `f` exits.
    pub fn run_elevated<F, R>(&self, f: F) -> Result<R, PrivilegeError>
    where
        F: FnOnce() -> R,
    {
        self.raise()?;
        let guard = ElevationGuard(self);
        let result = f();
        drop(guard);
        Ok(result)
    }
}

impl Drop for ElevationGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.0.drop_privileges() {
            // Nothing sane to do here; the caller exits through the
            // dedicated privilege-failure path.
            error!(%error, "failed to restore unprivileged identity");
        }
    }
}
