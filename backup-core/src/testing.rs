//! 测试用的执行器与 PITR 检查器替身

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backup::executor::{BackupExecutor, ExecutorError, PerformBackupParams};
use crate::backup::pitr::{PitrTimerangeInspector, Timeline};
use crate::db::{Database, inventory};
use crate::error::{BackupError, Result};
use crate::models::{
    Artifact, BackupLocation, LocationType, Service, ServiceType, Storage,
};

/// 记录调用的备份执行器
///
/// 创建时可设置为阻塞模式：`perform_backup` 通知开始后一直等待 `release()`。
pub struct FakeExecutor {
    started: mpsc::UnboundedSender<PerformBackupParams>,
    released: CancellationToken,
    pub backups: Mutex<Vec<PerformBackupParams>>,
    pub restores: Mutex<Vec<(String, String, Option<DateTime<Utc>>)>>,
    pub pitr_switches: Mutex<Vec<(String, bool)>>,
    pub fail_with: Mutex<Option<ExecutorError>>,
}

impl FakeExecutor {
    /// 立即完成的执行器
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PerformBackupParams>) {
        Self::build(true)
    }

    /// 开始后阻塞，直到调用 `release()`
    pub fn blocking() -> (Self, mpsc::UnboundedReceiver<PerformBackupParams>) {
        Self::build(false)
    }

    fn build(released: bool) -> (Self, mpsc::UnboundedReceiver<PerformBackupParams>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let gate = CancellationToken::new();
        if released {
            gate.cancel();
        }
        let executor = Self {
            started,
            released: gate,
            backups: Mutex::new(Vec::new()),
            restores: Mutex::new(Vec::new()),
            pitr_switches: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        };
        (executor, started_rx)
    }

    pub fn release(&self) {
        self.released.cancel();
    }

    pub fn fail_next(&self, err: ExecutorError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    fn take_failure(&self) -> Option<ExecutorError> {
        self.fail_with.lock().unwrap().take()
    }
}

#[async_trait]
impl BackupExecutor for FakeExecutor {
    async fn perform_backup(
        &self,
        cancel: CancellationToken,
        params: PerformBackupParams,
    ) -> Result<String> {
        self.backups.lock().unwrap().push(params.clone());
        let _ = self.started.send(params);

        tokio::select! {
            _ = self.released.cancelled() => {}
            _ = cancel.cancelled() => return Err(BackupError::Cancelled),
        }

        match self.take_failure() {
            Some(err) => Err(err.into()),
            None => Ok(Uuid::now_v7().to_string()),
        }
    }

    async fn restore_backup(
        &self,
        _cancel: CancellationToken,
        service_id: &str,
        artifact_id: &str,
        pitr_timestamp: Option<DateTime<Utc>>,
    ) -> Result<String> {
        if let Some(err) = self.take_failure() {
            return Err(err.into());
        }
        self.restores.lock().unwrap().push((
            service_id.to_string(),
            artifact_id.to_string(),
            pitr_timestamp,
        ));
        Ok(Uuid::now_v7().to_string())
    }

    async fn switch_mongo_pitr(
        &self,
        _cancel: CancellationToken,
        service_id: &str,
        enabled: bool,
    ) -> Result<()> {
        if let Some(err) = self.take_failure() {
            return Err(err.into());
        }
        self.pitr_switches
            .lock()
            .unwrap()
            .push((service_id.to_string(), enabled));
        Ok(())
    }
}

/// 返回固定时间线的检查器
pub struct FakeInspector {
    pub timelines: Vec<Timeline>,
}

#[async_trait]
impl PitrTimerangeInspector for FakeInspector {
    async fn list_pitr_timeranges(
        &self,
        _cancel: CancellationToken,
        _storage: &Storage,
        _location: &BackupLocation,
        _artifact: &Artifact,
    ) -> Result<Vec<Timeline>> {
        Ok(self.timelines.clone())
    }
}

/// 写入一个服务和一个文件系统存储位置
pub async fn seed_inventory(
    db: &Database,
    service_id: &str,
    service_type: ServiceType,
    cluster: &str,
    location_id: &str,
) {
    let service = Service {
        service_id: service_id.to_string(),
        service_name: format!("{service_id}-name"),
        service_type,
        cluster: cluster.to_string(),
    };
    let location = BackupLocation {
        id: location_id.to_string(),
        name: format!("{location_id}-name"),
        description: String::new(),
        location_type: LocationType::Filesystem,
        config: serde_json::json!({ "path": "/var/backups" }),
    };
    db.transaction(move |conn| {
        inventory::insert_service(conn, &service)?;
        if inventory::find_location_by_id(conn, &location.id).is_err() {
            inventory::insert_location(conn, &location)?;
        }
        Ok(())
    })
    .await
    .unwrap();
}

/// 轮询直到条件成立，超时则 panic
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("条件在 {timeout:?} 内未满足");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
