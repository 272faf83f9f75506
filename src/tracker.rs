//! 복약 관리 모듈
//!
//! 복약 목록과 복용 기록을 하나의 소유 객체로 묶어 관리합니다.
//! 모든 변경은 이 객체를 통해서만 일어나며, 변경 후에는 저장소에 기록합니다.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    AdherenceStats, DoseEvent, HistoryLog, Medication, MedicationDraft, MedicationStatus, NextDose, Notice,
    StatusBadge, Theme,
};
use crate::schedule;
use crate::store::{self, KeyValueStore};

/// 화면에 표시할 복약 카드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicationCard {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub next_dose: Option<String>, // "09:00" 또는 "Tomorrow at 09:00"
    pub frequency_label: &'static str,
    pub notes: Option<String>,
    pub status: StatusBadge,
    pub badge_class: &'static str,
    pub can_mark_taken: bool,
}

pub struct MedTracker<S: KeyValueStore> {
    medications: Vec<Medication>,
    history: HistoryLog,
    theme: Theme,
    store: S,
}

impl<S: KeyValueStore> MedTracker<S> {
    /// 저장소에서 읽어 시작. 손상된 데이터는 빈 목록으로 대체됩니다.
    pub fn load(store: S) -> Self {
        let medications = store::load_medications(&store);
        let history = store::load_history(&store);
        let theme = store::load_theme(&store);

        log::info!("[복약 관리] 복약 {}개 로드", medications.len());

        Self {
            medications,
            history,
            theme,
            store,
        }
    }

    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn find(&self, id: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    /// 저장 실패는 안내 메시지로만 알리고 메모리 상태는 유지합니다.
    fn persist(&mut self, notices: &mut Vec<Notice>) {
        if let Err(e) = store::save_state(&mut self.store, &self.medications, &self.history) {
            log::error!("[복약 관리] 저장 실패: {}", e);
            notices.push(Notice::error("Error saving data"));
        }
    }

    /// 복약 등록
    ///
    /// 검증에 실패하면 아무것도 바뀌지 않습니다.
    pub fn add_medication(&mut self, draft: MedicationDraft, now: DateTime<Utc>) -> AppResult<Vec<Notice>> {
        let medication = Medication::from_draft(draft, now)?;
        log::info!("[복약 관리] 복약 등록: {} ({})", medication.name, medication.id);
        self.medications.push(medication);

        let mut notices = Vec::new();
        self.persist(&mut notices);
        notices.push(Notice::success("Medication added successfully!"));
        Ok(notices)
    }

    /// 복약 삭제
    ///
    /// 목록에서만 제거하며 해당 복약의 복용 기록은 남겨 둡니다.
    pub fn delete_medication(&mut self, id: &str) -> AppResult<Vec<Notice>> {
        let before = self.medications.len();
        self.medications.retain(|m| m.id != id);
        if self.medications.len() == before {
            return Err(AppError::NotFound(id.to_string()));
        }
        log::info!("[복약 관리] 복약 삭제: {}", id);

        let mut notices = Vec::new();
        self.persist(&mut notices);
        notices.push(Notice::info("Medication deleted"));
        Ok(notices)
    }

    /// 복용 체크
    pub fn mark_taken(&mut self, id: &str, now: DateTime<Local>) -> AppResult<Vec<Notice>> {
        if self.find(id).is_none() {
            return Err(AppError::NotFound(id.to_string()));
        }

        self.history
            .record(now.date_naive(), id, DoseEvent::taken(now.with_timezone(&Utc)));
        log::info!("[복약 관리] 복용 기록: {} ({})", id, now.format("%Y-%m-%d %H:%M"));

        let mut notices = Vec::new();
        self.persist(&mut notices);
        notices.push(Notice::success("Medication marked as taken!"));
        Ok(notices)
    }

    pub fn status(&self, medication: &Medication, now: DateTime<Local>) -> StatusBadge {
        let today = self.history.events(now.date_naive(), &medication.id);
        schedule::medication_status(medication, now.time(), today)
    }

    pub fn next_dose(&self, medication: &Medication, now: DateTime<Local>) -> Option<NextDose> {
        schedule::next_dose(medication, now.time())
    }

    /// 전체 복약 카드 (등록 순서)
    pub fn cards(&self, now: DateTime<Local>) -> Vec<MedicationCard> {
        self.medications
            .iter()
            .map(|medication| {
                let status = self.status(medication, now);
                MedicationCard {
                    id: medication.id.clone(),
                    name: medication.name.clone(),
                    dosage: medication.dosage.clone(),
                    next_dose: self.next_dose(medication, now).map(|n| n.to_string()),
                    frequency_label: medication.frequency.label(),
                    notes: medication.notes.clone(),
                    badge_class: status.badge_class(),
                    can_mark_taken: status.status != MedicationStatus::Taken,
                    status,
                }
            })
            .collect()
    }

    /// 오늘의 순응도
    pub fn stats(&self, today: NaiveDate) -> AdherenceStats {
        schedule::adherence(&self.medications, self.history.day(today))
    }

    /// 밝은/어두운 테마 전환
    pub fn toggle_theme(&mut self) -> (Theme, Vec<Notice>) {
        self.theme = self.theme.toggled();

        let mut notices = Vec::new();
        if let Err(e) = store::save_theme(&mut self.store, self.theme) {
            log::error!("[복약 관리] 테마 저장 실패: {}", e);
            notices.push(Notice::error("Error saving data"));
        }
        (self.theme, notices)
    }
}
