//! 복약 알림 서비스
//!
//! 하나의 태스크가 복약 데이터를 단독으로 소유하고, 화면 쪽 요청(명령)과
//! 1분 주기 알림 확인을 차례로 처리합니다. 잠금 없이 단일 작성자만 존재합니다.

use chrono::{DateTime, Local, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::{AppError, AppResult};
use crate::models::{AdherenceStats, Medication, MedicationDraft, Notice, Theme};
use crate::notification::{NotificationScheduler, NotificationSink};
use crate::store::KeyValueStore;
use crate::tracker::{MedTracker, MedicationCard};

const COMMAND_BUFFER: usize = 32;
const PROMPT_MESSAGE: &str = "Enable notifications to get reminders when a dose is due";

/// 현재 시각 제공
pub trait Clock: Send + 'static {
    fn now(&self) -> DateTime<Local>;
}

/// 시스템 시계 (현지 시간)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// 고정 시계. 테스트나 시뮬레이션에서 시각을 직접 바꿉니다.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        match self.now.lock() {
            Ok(mut current) => *current = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// 주기 알림 타이머
///
/// 다시 설정하면 이전 타이머는 버려지므로 확인이 겹쳐 실행되지 않습니다.
pub struct ReminderTimer {
    period: Duration,
    interval: Interval,
}

impl ReminderTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: Self::arm(period),
        }
    }

    fn arm(period: Duration) -> Interval {
        // 첫 확인은 호출한 쪽에서 즉시 하므로 한 주기 뒤부터 시작
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    pub fn rearm(&mut self) {
        self.interval = Self::arm(self.period);
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

enum Command {
    AddMedication {
        draft: MedicationDraft,
        reply: oneshot::Sender<AppResult<Vec<Notice>>>,
    },
    DeleteMedication {
        id: String,
        reply: oneshot::Sender<AppResult<Vec<Notice>>>,
    },
    MarkTaken {
        id: String,
        reply: oneshot::Sender<AppResult<Vec<Notice>>>,
    },
    Medications {
        reply: oneshot::Sender<Vec<Medication>>,
    },
    Cards {
        reply: oneshot::Sender<Vec<MedicationCard>>,
    },
    Stats {
        reply: oneshot::Sender<AdherenceStats>,
    },
    ToggleTheme {
        reply: oneshot::Sender<(Theme, Vec<Notice>)>,
    },
    ShouldPrompt {
        reply: oneshot::Sender<bool>,
    },
    RestartTimer,
    Shutdown,
}

struct TrackerService<K: KeyValueStore, S: NotificationSink, C: Clock> {
    tracker: MedTracker<K>,
    scheduler: NotificationScheduler<S>,
    clock: C,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<K, S, C> TrackerService<K, S, C>
where
    K: KeyValueStore + Send + 'static,
    S: NotificationSink,
    C: Clock,
{
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, period: Duration) {
        log::info!("[알림 스케줄러] 시작됨 (주기 {:?})", period);

        let mut timer = ReminderTimer::new(period);
        self.check_due();

        loop {
            tokio::select! {
                _ = timer.tick() => self.check_due(),
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(Command::RestartTimer) => {
                        timer.rearm();
                        self.check_due();
                    }
                    Some(command) => self.handle(command),
                },
            }
        }

        log::info!("[알림 스케줄러] 중지됨");
    }

    fn check_due(&self) {
        let now = self.clock.now();
        let notices = self.scheduler.check_medication_times(
            self.tracker.medications(),
            self.tracker.history(),
            now.naive_local(),
        );
        for notice in notices {
            self.publish(notice);
        }
    }

    fn publish(&self, notice: Notice) {
        // 받는 쪽이 없으면 버림
        let _ = self.notices.send(notice);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::AddMedication { draft, reply } => {
                let result = self.tracker.add_medication(draft, self.clock.now().with_timezone(&Utc));
                let first = result.is_ok() && self.tracker.medications().len() == 1;
                let _ = reply.send(result);
                if first && self.scheduler.should_prompt(1) {
                    self.publish(Notice::info(PROMPT_MESSAGE));
                }
            }
            Command::DeleteMedication { id, reply } => {
                let _ = reply.send(self.tracker.delete_medication(&id));
            }
            Command::MarkTaken { id, reply } => {
                let _ = reply.send(self.tracker.mark_taken(&id, self.clock.now()));
            }
            Command::Medications { reply } => {
                let _ = reply.send(self.tracker.medications().to_vec());
            }
            Command::Cards { reply } => {
                let _ = reply.send(self.tracker.cards(self.clock.now()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.tracker.stats(self.clock.now().date_naive()));
            }
            Command::ToggleTheme { reply } => {
                let _ = reply.send(self.tracker.toggle_theme());
            }
            Command::ShouldPrompt { reply } => {
                let _ = reply.send(self.scheduler.should_prompt(self.tracker.medications().len()));
            }
            Command::RestartTimer | Command::Shutdown => {}
        }
    }
}

/// 서비스 요청 핸들 (복제해서 여러 곳에서 사용)
pub struct TrackerHandle<S: NotificationSink> {
    commands: mpsc::Sender<Command>,
    scheduler: NotificationScheduler<S>,
}

impl<S: NotificationSink> Clone for TrackerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: NotificationSink> TrackerHandle<S> {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> AppResult<T> {
        let (reply, receiver) = oneshot::channel();
        self.send(make(reply)).await?;
        receiver
            .await
            .map_err(|_| AppError::Custom("tracker service stopped".to_string()))
    }

    async fn send(&self, command: Command) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Custom("tracker service stopped".to_string()))
    }

    pub async fn add_medication(&self, draft: MedicationDraft) -> AppResult<Vec<Notice>> {
        self.request(|reply| Command::AddMedication { draft, reply }).await?
    }

    pub async fn delete_medication(&self, id: &str) -> AppResult<Vec<Notice>> {
        let id = id.to_string();
        self.request(|reply| Command::DeleteMedication { id, reply }).await?
    }

    pub async fn mark_taken(&self, id: &str) -> AppResult<Vec<Notice>> {
        let id = id.to_string();
        self.request(|reply| Command::MarkTaken { id, reply }).await?
    }

    pub async fn medications(&self) -> AppResult<Vec<Medication>> {
        self.request(|reply| Command::Medications { reply }).await
    }

    pub async fn cards(&self) -> AppResult<Vec<MedicationCard>> {
        self.request(|reply| Command::Cards { reply }).await
    }

    pub async fn stats(&self) -> AppResult<AdherenceStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn toggle_theme(&self) -> AppResult<(Theme, Vec<Notice>)> {
        self.request(|reply| Command::ToggleTheme { reply }).await
    }

    pub async fn should_prompt_for_notifications(&self) -> AppResult<bool> {
        self.request(|reply| Command::ShouldPrompt { reply }).await
    }

    /// 알림 권한 요청
    ///
    /// 서비스 태스크를 거치지 않으므로 사용자 응답을 기다리는 동안에도
    /// 다른 요청과 알림 확인은 계속 처리됩니다.
    pub async fn request_notification_permission(&self) -> Notice {
        self.scheduler.request_permission().await
    }

    /// 타이머를 새로 설정하고 즉시 한 번 확인
    pub async fn restart_timer(&self) -> AppResult<()> {
        self.send(Command::RestartTimer).await
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        self.send(Command::Shutdown).await
    }
}

/// 서비스 태스크 시작
///
/// 시작 직후 한 번, 이후 `period`마다 복약 알림을 확인합니다.
/// 처리 중 생긴 안내 메시지(알림 실패, 권한 안내)는 반환된 수신기로 전달됩니다.
pub fn spawn<K, S, C>(
    tracker: MedTracker<K>,
    sink: Arc<S>,
    clock: C,
    period: Duration,
) -> (TrackerHandle<S>, mpsc::UnboundedReceiver<Notice>, JoinHandle<()>)
where
    K: KeyValueStore + Send + 'static,
    S: NotificationSink,
    C: Clock,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let scheduler = NotificationScheduler::new(sink);

    let service = TrackerService {
        tracker,
        scheduler: scheduler.clone(),
        clock,
        notices: notices_tx,
    };
    let task = tokio::spawn(service.run(commands_rx, period));

    let handle = TrackerHandle {
        commands: commands_tx,
        scheduler,
    };
    (handle, notices_rx, task)
}
