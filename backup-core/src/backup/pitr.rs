use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Artifact, BackupLocation, Storage};

/// 可恢复的连续时间段，起止为 Unix 秒
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub replica_set: String,
    pub start: u32,
    pub end: u32,
}

/// 读取存储中的 oplog 分片，计算可用的时间段
#[async_trait]
pub trait PitrTimerangeInspector: Send + Sync {
    async fn list_pitr_timeranges(
        &self,
        cancel: CancellationToken,
        storage: &Storage,
        location: &BackupLocation,
        artifact: &Artifact,
    ) -> Result<Vec<Timeline>>;
}
