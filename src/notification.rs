//! 알림 모듈
//!
//! 복용 시각이 된 복약에 대해 시스템 알림을 발송합니다.
//! 실제 알림 표시는 `NotificationSink` 구현이 담당하며,
//! 같은 태그(복약 ID)의 알림을 겹쳐 띄우지 않는 것도 알림 표시 쪽의 책임입니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{AppError, AppResult};
use crate::models::{HistoryLog, Medication, Notice};
use crate::schedule;

const REMINDER_TITLE: &str = "💊 MedTracker Reminder";
const REMINDER_ICON: &str = "data:image/svg+xml,<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 100\"><text y=\".9em\" font-size=\"90\">💊</text></svg>";

/// 알림 권한
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Granted,
    Denied,
    Default, // 아직 묻지 않음
}

/// 알림 클릭 시 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickAction {
    FocusAndClose, // 앱 창을 앞으로 가져오고 알림 닫기
}

/// 복약 알림 내용
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,               // 중복 방지 태그 (복약 ID)
    pub require_interaction: bool, // 사용자가 직접 닫을 때까지 유지
    pub on_click: ClickAction,
}

impl Reminder {
    pub fn for_medication(medication: &Medication) -> Self {
        Self {
            title: REMINDER_TITLE.to_string(),
            body: format!("Time to take {} ({})", medication.name, medication.dosage),
            icon: REMINDER_ICON.to_string(),
            tag: medication.id.clone(),
            require_interaction: true,
            on_click: ClickAction::FocusAndClose,
        }
    }
}

/// 알림 표시 대상 (시스템 알림, 테스트 스텁 등)
pub trait NotificationSink: Send + Sync + 'static {
    /// 알림 기능 지원 여부
    fn is_supported(&self) -> bool;

    fn permission(&self) -> Permission;

    /// 사용자에게 알림 권한 요청. 사용자가 응답할 때까지 대기합니다.
    fn request_permission(&self) -> impl Future<Output = AppResult<Permission>> + Send;

    fn show(&self, reminder: &Reminder) -> AppResult<()>;
}

/// 로그로 알림을 남기는 기본 구현
///
/// 같은 태그의 알림은 `dedup_window` 안에 한 번만 표시합니다.
pub struct LogSink {
    permission: RwLock<Permission>,
    dedup_window: chrono::Duration,
    last_shown: Mutex<HashMap<String, DateTime<Utc>>>,
    delivered: AtomicUsize,
}

impl LogSink {
    pub fn new(permission: Permission, dedup_window_minutes: i64) -> Self {
        Self {
            permission: RwLock::new(permission),
            dedup_window: chrono::Duration::minutes(dedup_window_minutes),
            last_shown: Mutex::new(HashMap::new()),
            delivered: AtomicUsize::new(0),
        }
    }

    /// 실제로 표시된 알림 수
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn has_recent(&self, tag: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let mut last_shown = self
            .last_shown
            .lock()
            .map_err(|_| AppError::Notification("lock poisoned".to_string()))?;

        last_shown.retain(|_, shown_at| now - *shown_at < self.dedup_window);
        if let Some(shown_at) = last_shown.get(tag) {
            if now - *shown_at < self.dedup_window {
                return Ok(true);
            }
        }

        last_shown.insert(tag.to_string(), now);
        Ok(false)
    }
}

impl NotificationSink for LogSink {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        self.permission
            .read()
            .map(|p| *p)
            .unwrap_or(Permission::Denied)
    }

    fn request_permission(&self) -> impl Future<Output = AppResult<Permission>> + Send {
        async move {
            // 로그 출력에는 물어볼 사용자가 없으므로 바로 허용
            match self.permission.write() {
                Ok(mut permission) => {
                    *permission = Permission::Granted;
                    Ok(Permission::Granted)
                }
                Err(_) => Err(AppError::Notification("lock poisoned".to_string())),
            }
        }
    }

    fn show(&self, reminder: &Reminder) -> AppResult<()> {
        if self.has_recent(&reminder.tag, Utc::now())? {
            log::debug!("[알림] 중복 알림 생략: {}", reminder.tag);
            return Ok(());
        }

        self.delivered.fetch_add(1, Ordering::SeqCst);
        log::info!("[알림] {} - {}", reminder.title, reminder.body);
        Ok(())
    }
}

/// 복약 알림 발송기
pub struct NotificationScheduler<S: NotificationSink> {
    sink: Arc<S>,
}

impl<S: NotificationSink> Clone for NotificationScheduler<S> {
    fn clone(&self) -> Self {
        Self { sink: Arc::clone(&self.sink) }
    }
}

impl<S: NotificationSink> NotificationScheduler<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 복약 시간 확인 및 알림 발송
    ///
    /// 권한이 없으면 아무것도 하지 않습니다. 발송 실패는 안내 메시지로 돌려주며
    /// 복약 데이터에는 영향이 없습니다.
    pub fn check_medication_times(
        &self,
        medications: &[Medication],
        history: &HistoryLog,
        now: NaiveDateTime,
    ) -> Vec<Notice> {
        if !self.sink.is_supported() || self.sink.permission() != Permission::Granted {
            return Vec::new();
        }

        let today = history.day(now.date());
        let mut notices = Vec::new();

        for medication in schedule::due_reminders(medications, now.time(), today) {
            let reminder = Reminder::for_medication(medication);
            match self.sink.show(&reminder) {
                Ok(()) => log::info!("[알림 스케줄러] 복약 알림 발송: {}", medication.name),
                Err(e) => {
                    log::error!("[알림 스케줄러] 알림 발송 실패: {}", e);
                    notices.push(Notice::error("Error showing notification"));
                }
            }
        }

        notices
    }

    /// 알림 권한 요청
    pub async fn request_permission(&self) -> Notice {
        if !self.sink.is_supported() {
            log::warn!("[알림] 알림 기능을 지원하지 않는 환경");
            return Notice::error("Notifications are not supported");
        }

        match self.sink.request_permission().await {
            Ok(Permission::Granted) => {
                log::info!("[알림] 알림 권한 허용");
                Notice::success("Notifications enabled!")
            }
            Ok(permission) => {
                log::info!("[알림] 알림 권한 거부: {:?}", permission);
                Notice::error("Notifications permission denied")
            }
            Err(e) => {
                log::error!("[알림] 알림 권한 요청 실패: {}", e);
                Notice::error("Error enabling notifications")
            }
        }
    }

    /// 알림 권한 안내를 띄워야 하는지 (아직 묻지 않았고 복약이 있을 때)
    pub fn should_prompt(&self, medication_count: usize) -> bool {
        self.sink.is_supported() && self.sink.permission() == Permission::Default && medication_count > 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{DoseEvent, Frequency, MedicationDraft};
    use chrono::NaiveDate;

    /// 발송된 알림을 기록하는 테스트용 구현
    pub(crate) struct RecordingSink {
        pub permission: RwLock<Permission>,
        pub answer: Permission,
        pub fail_show: bool,
        pub shown: Mutex<Vec<Reminder>>,
    }

    impl RecordingSink {
        pub(crate) fn new(permission: Permission) -> Self {
            Self {
                permission: RwLock::new(permission),
                answer: Permission::Granted,
                fail_show: false,
                shown: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn shown_tags(&self) -> Vec<String> {
            self.shown.lock().unwrap().iter().map(|r| r.tag.clone()).collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn is_supported(&self) -> bool {
            true
        }

        fn permission(&self) -> Permission {
            *self.permission.read().unwrap()
        }

        fn request_permission(&self) -> impl Future<Output = AppResult<Permission>> + Send {
            async move {
                *self.permission.write().unwrap() = self.answer;
                Ok::<_, AppError>(self.answer)
            }
        }

        fn show(&self, reminder: &Reminder) -> AppResult<()> {
            if self.fail_show {
                return Err(AppError::Notification("display failed".to_string()));
            }
            self.shown.lock().unwrap().push(reminder.clone());
            Ok(())
        }
    }

    fn medication(frequency: Frequency, times: &[&str]) -> Medication {
        Medication::from_draft(
            MedicationDraft {
                name: "Atorvastatin".to_string(),
                dosage: "20mg".to_string(),
                frequency: Some(frequency),
                times: times.iter().map(|t| t.to_string()).collect(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn at(time: &str) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_time(chrono::NaiveTime::parse_from_str(time, "%H:%M").unwrap())
    }

    #[test]
    fn test_reminder_payload() {
        let med = medication(Frequency::Daily, &["09:00"]);
        let reminder = Reminder::for_medication(&med);
        assert_eq!(reminder.title, "💊 MedTracker Reminder");
        assert_eq!(reminder.body, "Time to take Atorvastatin (20mg)");
        assert_eq!(reminder.tag, med.id);
        assert!(reminder.require_interaction);
    }

    #[test]
    fn test_check_sends_due_reminders() {
        let sink = Arc::new(RecordingSink::new(Permission::Granted));
        let scheduler = NotificationScheduler::new(Arc::clone(&sink));
        let meds = vec![
            medication(Frequency::Daily, &["09:00"]),
            medication(Frequency::Daily, &["12:00"]),
        ];

        let notices = scheduler.check_medication_times(&meds, &HistoryLog::new(), at("09:01"));
        assert!(notices.is_empty());
        assert_eq!(sink.shown_tags(), vec![meds[0].id.clone()]);

        scheduler.check_medication_times(&meds, &HistoryLog::new(), at("09:02"));
        assert_eq!(sink.shown_tags().len(), 1);
    }

    #[test]
    fn test_check_skips_taken_once_daily() {
        let sink = Arc::new(RecordingSink::new(Permission::Granted));
        let scheduler = NotificationScheduler::new(Arc::clone(&sink));
        let meds = vec![medication(Frequency::Daily, &["09:00"])];
        let mut history = HistoryLog::new();
        history.record(at("08:00").date(), &meds[0].id, DoseEvent::taken(Utc::now()));

        scheduler.check_medication_times(&meds, &history, at("09:00"));
        assert!(sink.shown_tags().is_empty());
    }

    #[test]
    fn test_check_requires_permission() {
        let sink = Arc::new(RecordingSink::new(Permission::Default));
        let scheduler = NotificationScheduler::new(Arc::clone(&sink));
        let meds = vec![medication(Frequency::Daily, &["09:00"])];

        scheduler.check_medication_times(&meds, &HistoryLog::new(), at("09:00"));
        assert!(sink.shown_tags().is_empty());
        assert!(scheduler.should_prompt(meds.len()));
        assert!(!scheduler.should_prompt(0));
    }

    #[test]
    fn test_show_failure_becomes_notice() {
        let mut sink = RecordingSink::new(Permission::Granted);
        sink.fail_show = true;
        let scheduler = NotificationScheduler::new(Arc::new(sink));
        let meds = vec![medication(Frequency::Daily, &["09:00"])];

        let notices = scheduler.check_medication_times(&meds, &HistoryLog::new(), at("09:00"));
        assert_eq!(notices, vec![Notice::error("Error showing notification")]);
    }

    #[tokio::test]
    async fn test_request_permission_notices() {
        let scheduler = NotificationScheduler::new(Arc::new(RecordingSink::new(Permission::Default)));
        assert_eq!(scheduler.request_permission().await, Notice::success("Notifications enabled!"));
        assert_eq!(scheduler.sink().permission(), Permission::Granted);

        let mut denying = RecordingSink::new(Permission::Default);
        denying.answer = Permission::Denied;
        let scheduler = NotificationScheduler::new(Arc::new(denying));
        assert_eq!(
            scheduler.request_permission().await,
            Notice::error("Notifications permission denied")
        );
    }

    #[test]
    fn test_log_sink_deduplicates_by_tag() {
        let sink = LogSink::new(Permission::Granted, 5);
        let med = medication(Frequency::Daily, &["09:00"]);
        let other = medication(Frequency::Daily, &["09:00"]);

        sink.show(&Reminder::for_medication(&med)).unwrap();
        sink.show(&Reminder::for_medication(&med)).unwrap();
        sink.show(&Reminder::for_medication(&other)).unwrap();
        assert_eq!(sink.delivered(), 2);
    }

    #[test]
    fn test_log_sink_forgets_expired_tags() {
        let sink = LogSink::new(Permission::Granted, 5);
        let start = Utc::now();

        assert!(!sink.has_recent("a", start).unwrap());
        assert!(!sink.has_recent("b", start + chrono::Duration::minutes(10)).unwrap());
        assert_eq!(sink.last_shown.lock().unwrap().len(), 1);
        assert!(!sink.has_recent("a", start + chrono::Duration::minutes(11)).unwrap());
    }

    #[tokio::test]
    async fn test_log_sink_grants_permission() {
        let sink = LogSink::new(Permission::Default, 5);
        assert_eq!(sink.permission(), Permission::Default);
        assert_eq!(sink.request_permission().await.unwrap(), Permission::Granted);
        assert_eq!(sink.permission(), Permission::Granted);
    }
}
