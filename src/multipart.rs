//! Multi-partition driver: images a whole disk as one container per member
//! partition (§4.K, component K).
//!
//! Grounded on the same three-stage pipeline as a single-volume backup —
//! this module adds no new I/O path, it just invokes
//! [`PipelineCoordinator`] once per member, in order, wrapping each call
//! with a snapshot acquire/release pair. Member-partition discovery
//! (reading a partition table) is filesystem/platform-specific and out of
//! scope (§1), so the caller supplies the member list explicitly, the same
//! way `BackupRequest::allocation_map` is caller-supplied rather than
//! derived from live filesystem metadata.

use std::path::{Path, PathBuf};

use crate::collab::{ProgressSink, SnapshotProvider, UserFeedback};
use crate::config::{PipelineConfig, VolumeKind};
use crate::error::Result;
use crate::pipeline::{BackupOutcome, BackupRequest, PipelineCoordinator, RestoreOutcome, RestoreRequest};

/// One partition belonging to a whole disk being imaged.
#[derive(Debug, Clone)]
pub struct Member {
    /// The partition's device path (e.g. `/dev/sda1`), before snapshotting.
    pub device_path: PathBuf,
    /// Name encoded into the per-member container filename (e.g. `sda1`).
    pub name: String,
    pub cluster_size: u32,
}

/// Computes the per-member container path for `base` and `member`: the
/// member's name is inserted as a `-<name>` suffix on the base's stem,
/// mirroring the part-0/part-N naming convention in `container::part_path`
/// (a fixed, predictable transform of the base path rather than a
/// caller-supplied template).
pub fn member_container_path(base: &Path, member: &Member) -> PathBuf {
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    let ext = base.extension().map(|e| e.to_string_lossy().to_string());
    let mut name = format!("{stem}-{}", member.name);
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(&ext);
    }
    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

pub struct MultiPartitionBackupRequest {
    pub base_container_path: PathBuf,
    pub members: Vec<Member>,
    pub config: PipelineConfig,
}

pub struct MultiPartitionRestoreRequest {
    pub base_container_path: PathBuf,
    /// Members paired with the device/file each member's container should
    /// be restored onto.
    pub members: Vec<(Member, PathBuf)>,
    pub config: PipelineConfig,
}

/// Drives one whole-disk session: snapshot, per-member backup/restore in
/// order, release. Each member uses its own [`PipelineCoordinator`] so a
/// failure partway through leaves earlier members' containers intact and
/// usable (§4.K "Failure in any member aborts the remainder").
pub struct MultiPartitionDriver<'a> {
    snapshot: &'a mut dyn SnapshotProvider,
}

impl<'a> MultiPartitionDriver<'a> {
    pub fn new(snapshot: &'a mut dyn SnapshotProvider) -> Self {
        MultiPartitionDriver { snapshot }
    }

    /// Backs up every member of `req.members`, in order, into
    /// `member_container_path(base, member)`. Returns one outcome per
    /// member in the same order, or the first error encountered —
    /// containers written for earlier members are left on disk.
    pub fn backup(
        &mut self,
        req: MultiPartitionBackupRequest,
        mut make_progress: impl FnMut(&Member) -> Box<dyn ProgressSink>,
    ) -> Result<Vec<BackupOutcome>> {
        let mount_points: Vec<PathBuf> = req.members.iter().map(|m| m.device_path.clone()).collect();
        let snapshot_paths = self.snapshot.acquire(&mount_points);
        let result = (|| {
            let snapshot_paths = snapshot_paths?;
            let mut outcomes = Vec::with_capacity(req.members.len());
            for (member, device_path) in req.members.iter().zip(snapshot_paths) {
                let container_path = member_container_path(&req.base_container_path, member);
                let mut coordinator = PipelineCoordinator::new(make_progress(member));
                let outcome = coordinator.backup(BackupRequest {
                    device_path,
                    container_path,
                    volume_kind: VolumeKind::Partition,
                    cluster_size: member.cluster_size,
                    config: req.config.clone(),
                    allocation_map: None,
                })?;
                outcomes.push(outcome);
            }
            Ok(outcomes)
        })();
        self.snapshot.release(result.is_ok());
        result
    }

    /// Restores every member's container onto its paired target path, in
    /// order. No snapshotting is needed on the restore direction (the
    /// targets are being written, not read as a consistent point-in-time
    /// view), but the same ordered, fail-fast shape applies.
    pub fn restore(
        &mut self,
        req: MultiPartitionRestoreRequest,
        mut make_feedback: impl FnMut(&Member) -> Box<dyn UserFeedback>,
        mut make_progress: impl FnMut(&Member) -> Box<dyn ProgressSink>,
    ) -> Result<Vec<RestoreOutcome>> {
        let mut outcomes = Vec::with_capacity(req.members.len());
        for (member, target_path) in &req.members {
            let container_path = member_container_path(&req.base_container_path, member);
            let mut coordinator = PipelineCoordinator::new(make_progress(member));
            let outcome = coordinator.restore(RestoreRequest {
                container_path,
                target_path: target_path.clone(),
                config: req.config.clone(),
                feedback: make_feedback(member),
            })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_container_path_inserts_name_suffix() {
        let member = Member {
            device_path: PathBuf::from("/dev/sda1"),
            name: "sda1".to_string(),
            cluster_size: 4096,
        };
        let path = member_container_path(Path::new("/backups/disk.odin"), &member);
        assert_eq!(path, PathBuf::from("/backups/disk-sda1.odin"));
    }

    #[test]
    fn member_container_path_without_extension() {
        let member = Member {
            device_path: PathBuf::from("/dev/sda1"),
            name: "sda1".to_string(),
            cluster_size: 4096,
        };
        let path = member_container_path(Path::new("disk"), &member);
        assert_eq!(path, PathBuf::from("disk-sda1"));
    }
}
