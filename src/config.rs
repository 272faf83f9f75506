use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application-level constants
pub const APP_NAME: &str = "MedTracker";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 저장소 키
pub const MEDICATIONS_KEY: &str = "medtracker_medications";
pub const HISTORY_KEY: &str = "medtracker_history";
pub const THEME_KEY: &str = "medtracker_theme";

const DATA_DIR_ENV: &str = "MEDTRACKER_DATA_DIR";
const CHECK_INTERVAL_ENV: &str = "MEDTRACKER_CHECK_INTERVAL_SECS";

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_DEDUP_WINDOW_MINUTES: i64 = 5;
const DEFAULT_PROMPT_DELAY_SECS: u64 = 2;

/// 실행 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub check_interval: Duration,     // 복약 알림 확인 주기
    pub dedup_window_minutes: i64,    // 같은 복약의 알림을 다시 띄우지 않는 시간
    pub prompt_delay: Duration,       // 시작 후 알림 권한 안내까지 대기
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            dedup_window_minutes: DEFAULT_DEDUP_WINDOW_MINUTES,
            prompt_delay: Duration::from_secs(DEFAULT_PROMPT_DELAY_SECS),
        }
    }
}

impl AppConfig {
    /// 환경 변수로 기본값 덮어쓰기
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(CHECK_INTERVAL_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::Custom(format!("{} must be a positive integer, got {:?}", CHECK_INTERVAL_ENV, raw))
            })?;
            if secs == 0 {
                return Err(AppError::Custom(format!("{} must be greater than zero", CHECK_INTERVAL_ENV)));
            }
            config.check_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// 데이터베이스 경로 (디렉터리가 없으면 생성)
    pub fn db_path(&self) -> AppResult<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(self.data_dir.join("medtracker.db"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("medtracker")
}
