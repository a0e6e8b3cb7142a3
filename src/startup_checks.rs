//! Startup requirement validation for cg-stat-collector.
//!
//! This module checks that the configured sources can find what they sample
//! before the first cycle runs. Every finding is a warning: the collector
//! starts anyway and an affected source simply produces fewer documents.

use nix::unistd::geteuid;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, SourceSpec};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cgroup mount point not found: {0}")]
    MountPointMissing(PathBuf),

    #[error("cgroup controller {controller} not present below {mount_point}")]
    ControllerMissing {
        controller: String,
        mount_point: PathBuf,
    },

    #[error("ps binary not found: {0}")]
    PsMissing(PathBuf),

    #[error("ps binary is not executable: {0}")]
    PsNotExecutable(PathBuf),
}

/// Validate the runtime requirements of every configured source. Findings
/// are logged and returned; none of them stops the collector.
pub fn validate_requirements(cfg: &Config) -> Vec<ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();

    let mut findings = Vec::new();
    for spec in cfg.source_specs().unwrap_or_default() {
        match spec {
            SourceSpec::CgroupFs { mount_point } => {
                findings.extend(check_cgroup_mount(&mount_point, &cfg.controllers()));
            }
            SourceSpec::UnixPs | SourceSpec::LinuxPs => {
                findings.extend(check_ps_binary(&cfg.ps_path()));
            }
            SourceSpec::Command { program, .. } => {
                debug!("Not checking command source {}", program);
            }
        }
    }

    if findings.is_empty() {
        info!("✅ All runtime requirements validated");
    }
    for f in &findings {
        warn!("⚠️  {}", f);
    }
    findings
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - some cgroup files may be unreadable");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Mount point must exist and carry a directory per configured controller.
pub fn check_cgroup_mount(mount_point: &Path, controllers: &[String]) -> Vec<ValidationError> {
    if !mount_point.is_dir() {
        return vec![ValidationError::MountPointMissing(mount_point.to_path_buf())];
    }

    controllers
        .iter()
        .filter(|c| !mount_point.join(c).is_dir())
        .map(|c| ValidationError::ControllerMissing {
            controller: c.clone(),
            mount_point: mount_point.to_path_buf(),
        })
        .collect()
}

/// `ps` must exist and have an execute bit set.
pub fn check_ps_binary(ps_path: &Path) -> Option<ValidationError> {
    match fs::metadata(ps_path) {
        Ok(meta) if meta.is_file() && meta.permissions().mode() & 0o111 != 0 => {
            info!("✅ ps found at {}", ps_path.display());
            None
        }
        Ok(_) => Some(ValidationError::PsNotExecutable(ps_path.to_path_buf())),
        Err(e) => {
            debug!("Cannot stat {}: {}", ps_path.display(), e);
            Some(ValidationError::PsMissing(ps_path.to_path_buf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_mount_point() {
        let findings = check_cgroup_mount(Path::new("/nonexistent/cgroup"), &["memory".into()]);
        assert_eq!(
            findings,
            vec![ValidationError::MountPointMissing(PathBuf::from(
                "/nonexistent/cgroup"
            ))]
        );
    }

    #[test]
    fn test_missing_controller_reported_individually() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("memory")).unwrap();

        let findings = check_cgroup_mount(dir.path(), &["memory".into(), "blkio".into()]);
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            &findings[0],
            ValidationError::ControllerMissing { controller, .. } if controller == "blkio"
        ));
    }

    #[test]
    fn test_ps_binary_checks() {
        let dir = tempdir().expect("Failed to create temp dir");
        let ps = dir.path().join("ps");
        fs::write(&ps, "#!/bin/sh\n").unwrap();

        assert_eq!(
            check_ps_binary(&ps),
            Some(ValidationError::PsNotExecutable(ps.clone()))
        );

        fs::set_permissions(&ps, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(check_ps_binary(&ps), None);

        assert!(matches!(
            check_ps_binary(&dir.path().join("nope")),
            Some(ValidationError::PsMissing(_))
        ));
    }

    #[test]
    fn test_validate_requirements_collects_findings() {
        let cfg = Config {
            sources: Some(vec!["cgroupfs,/nonexistent/cgroup".into(), "unixps".into()]),
            ps_path: Some(PathBuf::from("/nonexistent/ps")),
            ..Config::default()
        };
        let findings = validate_requirements(&cfg);
        assert_eq!(findings.len(), 2);
    }
}
