pub mod config;
pub mod error;
pub mod models;
pub mod notification;
pub mod schedule;
pub mod service;
pub mod store;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use config::AppConfig;
use error::{AppError, AppResult};
use models::{Notice, NoticeLevel};
use notification::{LogSink, NotificationSink, Permission};
use service::{SystemClock, TrackerHandle};
use store::SqliteStore;
use tracker::MedTracker;

/// 헤드리스 실행
///
/// 저장된 복약 데이터를 읽고 알림 서비스를 띄운 뒤 Ctrl-C까지 대기합니다.
pub async fn run() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    log::info!("{} {} 시작", config::APP_NAME, config::APP_VERSION);

    let store = SqliteStore::open(&config.db_path()?)?;
    let tracker = MedTracker::load(store);
    let sink = Arc::new(LogSink::new(Permission::Default, config.dedup_window_minutes));

    let (handle, mut notices, task) = service::spawn(tracker, sink, SystemClock, config.check_interval);

    let prompt = spawn_permission_prompt(handle.clone(), config.prompt_delay);

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Some(notice) => log_notice(&notice),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("[{}] 종료 신호 수신", config::APP_NAME);
                handle.shutdown().await?;
                break;
            }
        }
    }

    prompt.abort();
    task.await
        .map_err(|e| AppError::Custom(format!("tracker service failed: {}", e)))
}

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => log::warn!("[안내] {}", notice.message),
        NoticeLevel::Success | NoticeLevel::Info => log::info!("[안내] {}", notice.message),
    }
}

/// 시작 후 `delay`가 지나면 필요한 경우 알림 권한을 요청
///
/// 별도 태스크에서 기다리므로 대기 중에도 종료 신호를 받을 수 있습니다.
fn spawn_permission_prompt<S: NotificationSink>(handle: TrackerHandle<S>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match handle.should_prompt_for_notifications().await {
            Ok(true) => log_notice(&handle.request_notification_permission().await),
            Ok(false) => {}
            Err(e) => log::debug!("[알림] 권한 확인 생략: {}", e),
        }
    })
}
