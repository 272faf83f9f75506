use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// 복용 주기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,       // 하루 1회
    TwiceDaily,  // 하루 2회
    ThreeTimes,  // 하루 3회
    Weekly,      // 주 1회
    AsNeeded,    // 필요 시
}

impl Frequency {
    /// 화면 표시용 이름
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Daily => "Once Daily",
            Frequency::TwiceDaily => "Twice Daily",
            Frequency::ThreeTimes => "Three Times Daily",
            Frequency::Weekly => "Weekly",
            Frequency::AsNeeded => "As Needed",
        }
    }

    pub fn is_as_needed(&self) -> bool {
        matches!(self, Frequency::AsNeeded)
    }

    /// 등록 폼에 채워 넣을 기본 복용 시간대
    pub fn default_slots(&self) -> Vec<TimeSlot> {
        match self {
            Frequency::Daily => vec![TimeSlot::new("Time", DoseTime::at(9, 0))],
            Frequency::TwiceDaily => vec![
                TimeSlot::new("Morning", DoseTime::at(9, 0)),
                TimeSlot::new("Evening", DoseTime::at(21, 0)),
            ],
            Frequency::ThreeTimes => vec![
                TimeSlot::new("Morning", DoseTime::at(8, 0)),
                TimeSlot::new("Afternoon", DoseTime::at(14, 0)),
                TimeSlot::new("Evening", DoseTime::at(21, 0)),
            ],
            Frequency::Weekly => vec![TimeSlot::new("Weekly", DoseTime::at(9, 0))],
            Frequency::AsNeeded => Vec::new(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 등록 폼의 시간 입력 칸
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub label: &'static str,
    pub default_time: DoseTime,
}

impl TimeSlot {
    fn new(label: &'static str, default_time: DoseTime) -> Self {
        Self { label, default_time }
    }
}

/// 하루 중 복용 시각 (현지 시간, 시:분)
///
/// 저장 형식은 `"HH:MM"` 문자열입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DoseTime {
    hour: u8,
    minute: u8,
}

impl DoseTime {
    const fn at(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self::at(hour as u8, minute as u8))
        } else {
            None
        }
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self::at(time.hour() as u8, time.minute() as u8)
    }

    /// 자정부터 지난 분
    pub fn minutes_since_midnight(&self) -> i64 {
        self.hour as i64 * 60 + self.minute as i64
    }
}

impl FromStr for DoseTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self::from_naive)
            .map_err(|_| ValidationError::InvalidTime(s.to_string()))
    }
}

impl TryFrom<String> for DoseTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DoseTime> for String {
    fn from(value: DoseTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DoseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// 복약 등록 입력 (폼 값 그대로)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub times: Vec<String>,
    pub notes: Option<String>,
}

/// 복약 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,           // 용량 (자유 입력)
    pub frequency: Frequency,
    pub times: Vec<DoseTime>,     // 오름차순 정렬 유지
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Medication {
    /// 입력 검증 후 새 복약 생성
    ///
    /// 필요 시 복용이 아니면 복용 시각이 최소 하나 있어야 하고,
    /// 필요 시 복용이면 복용 시각이 없어야 합니다.
    /// 복용 시각은 오름차순으로 정렬되고 중복은 제거됩니다.
    pub fn from_draft(draft: MedicationDraft, created_at: DateTime<Utc>) -> Result<Self, ValidationError> {
        let name = draft.name.trim().to_string();
        let dosage = draft.dosage.trim().to_string();
        let frequency = draft.frequency.ok_or(ValidationError::MissingRequiredField)?;

        if name.is_empty() || dosage.is_empty() {
            return Err(ValidationError::MissingRequiredField);
        }

        let mut times = draft
            .times
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.parse::<DoseTime>())
            .collect::<Result<Vec<_>, _>>()?;

        check_schedule(frequency, &times)?;

        times.sort();
        times.dedup();

        let notes = draft
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            dosage,
            frequency,
            times,
            notes,
            created_at,
        })
    }

    /// 저장소에서 읽은 데이터 검증 및 복용 시각 정렬 보정
    pub fn normalize(&mut self) -> Result<(), ValidationError> {
        check_schedule(self.frequency, &self.times)?;
        self.times.sort();
        self.times.dedup();
        Ok(())
    }
}

/// 필요 시 복용이 아니면 복용 시각이 최소 하나, 필요 시 복용이면 없어야 함
fn check_schedule(frequency: Frequency, times: &[DoseTime]) -> Result<(), ValidationError> {
    if frequency.is_as_needed() {
        if !times.is_empty() {
            return Err(ValidationError::TimesForAsNeeded);
        }
    } else if times.is_empty() {
        return Err(ValidationError::MissingTimes);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Taken,
}

/// 복용 기록 (복용 체크 시점)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseEvent {
    pub taken_at: DateTime<Utc>,
    pub status: EventStatus,
}

impl DoseEvent {
    pub fn taken(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            status: EventStatus::Taken,
        }
    }
}

/// 하루치 복용 기록 (복약 ID -> 기록 목록)
pub type DayHistory = BTreeMap<String, Vec<DoseEvent>>;

/// 날짜별 복용 기록
///
/// 복용 체크가 한 번이라도 있었던 날만 항목이 생기며, 기록은 추가만 됩니다.
/// 삭제된 복약의 기록은 그대로 남지만 어디에서도 참조되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog(BTreeMap<NaiveDate, DayHistory>);

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, date: NaiveDate, medication_id: &str, event: DoseEvent) {
        self.0
            .entry(date)
            .or_default()
            .entry(medication_id.to_string())
            .or_default()
            .push(event);
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayHistory> {
        self.0.get(&date)
    }

    pub fn events(&self, date: NaiveDate, medication_id: &str) -> &[DoseEvent] {
        self.day(date)
            .and_then(|day| day.get(medication_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn taken_on(&self, date: NaiveDate, medication_id: &str) -> bool {
        !self.events(date, medication_id).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 현재 복약 상태 (저장하지 않고 매번 계산)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationStatus {
    Taken,    // 오늘 복용함
    DueNow,   // 복용 시간 (유예 60분 이내)
    Upcoming, // 예정
    Missed,   // 놓침
}

/// 상태 배지 (상태 + 표시 문구)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub status: MedicationStatus,
    pub label: &'static str,
}

impl StatusBadge {
    pub const TAKEN: StatusBadge = StatusBadge::new(MedicationStatus::Taken, "Taken Today");
    pub const AS_NEEDED: StatusBadge = StatusBadge::new(MedicationStatus::Upcoming, "As Needed");
    pub const DUE_NOW: StatusBadge = StatusBadge::new(MedicationStatus::DueNow, "Due Now");
    pub const MISSED: StatusBadge = StatusBadge::new(MedicationStatus::Missed, "Missed");
    pub const UPCOMING: StatusBadge = StatusBadge::new(MedicationStatus::Upcoming, "Upcoming");

    const fn new(status: MedicationStatus, label: &'static str) -> Self {
        Self { status, label }
    }

    /// 배지 스타일 클래스. 복용 시간 상태도 예정과 같은 스타일을 씁니다.
    pub fn badge_class(&self) -> &'static str {
        match self.status {
            MedicationStatus::Taken => "taken",
            MedicationStatus::DueNow | MedicationStatus::Upcoming => "upcoming",
            MedicationStatus::Missed => "missed",
        }
    }
}

/// 다음 복용 예정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "day", content = "time", rename_all = "snake_case")]
pub enum NextDose {
    Today(DoseTime),
    Tomorrow(DoseTime),
}

impl fmt::Display for NextDose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextDose::Today(time) => write!(f, "{}", time),
            NextDose::Tomorrow(time) => write!(f, "Tomorrow at {}", time),
        }
    }
}

/// 오늘의 복약 순응도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdherenceStats {
    pub total_meds: usize,
    pub taken_today: usize,
    pub adherence_rate: u32, // 0 ~ 100
}

impl AdherenceStats {
    pub fn rate_label(&self) -> String {
        format!("{}%", self.adherence_rate)
    }
}

/// 화면 테마
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// 사용자에게 잠깐 보여줄 안내 메시지 (토스트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(frequency: Frequency, times: &[&str]) -> MedicationDraft {
        MedicationDraft {
            name: " Metformin ".to_string(),
            dosage: "500mg".to_string(),
            frequency: Some(frequency),
            times: times.iter().map(|t| t.to_string()).collect(),
            notes: None,
        }
    }

    #[test]
    fn test_from_draft_sorts_and_trims() {
        let med = Medication::from_draft(draft(Frequency::ThreeTimes, &["21:00", "08:00", "14:00", "08:00"]), Utc::now())
            .unwrap();
        assert_eq!(med.name, "Metformin");
        let times: Vec<String> = med.times.iter().map(|t| t.to_string()).collect();
        assert_eq!(times, vec!["08:00", "14:00", "21:00"]);
        assert!(!med.id.is_empty());
    }

    #[test]
    fn test_from_draft_requires_times_unless_as_needed() {
        let err = Medication::from_draft(draft(Frequency::Daily, &[]), Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingTimes);

        let err = Medication::from_draft(draft(Frequency::Weekly, &[""]), Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::MissingTimes);

        let med = Medication::from_draft(draft(Frequency::AsNeeded, &[]), Utc::now()).unwrap();
        assert!(med.times.is_empty());

        let err = Medication::from_draft(draft(Frequency::AsNeeded, &["09:00"]), Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::TimesForAsNeeded);
    }

    #[test]
    fn test_from_draft_rejects_missing_fields() {
        let mut d = draft(Frequency::Daily, &["09:00"]);
        d.name = "   ".to_string();
        assert_eq!(
            Medication::from_draft(d, Utc::now()).unwrap_err(),
            ValidationError::MissingRequiredField
        );

        let mut d = draft(Frequency::Daily, &["09:00"]);
        d.frequency = None;
        assert_eq!(
            Medication::from_draft(d, Utc::now()).unwrap_err(),
            ValidationError::MissingRequiredField
        );
    }

    #[test]
    fn test_from_draft_rejects_bad_time() {
        let err = Medication::from_draft(draft(Frequency::Daily, &["25:00"]), Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidTime("25:00".to_string()));
    }

    #[test]
    fn test_dose_time_format() {
        let t: DoseTime = "9:05".parse().unwrap();
        assert_eq!(t.to_string(), "09:05");
        assert_eq!(t.minutes_since_midnight(), 545);
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"09:05\"");
        assert!(DoseTime::new(24, 0).is_none());
    }

    #[test]
    fn test_frequency_codes_match_storage_format() {
        assert_eq!(serde_json::to_string(&Frequency::ThreeTimes).unwrap(), "\"three_times\"");
        assert_eq!(serde_json::to_string(&Frequency::AsNeeded).unwrap(), "\"as_needed\"");
        assert_eq!(
            serde_json::from_str::<Frequency>("\"twice_daily\"").unwrap(),
            Frequency::TwiceDaily
        );
        assert!(Frequency::AsNeeded.default_slots().is_empty());
        assert_eq!(Frequency::ThreeTimes.default_slots()[1].default_time.to_string(), "14:00");
    }

    #[test]
    fn test_medication_and_history_round_trip() {
        let med = Medication::from_draft(draft(Frequency::TwiceDaily, &["21:00", "09:00"]), Utc::now()).unwrap();
        let meds = vec![med.clone()];
        let json = serde_json::to_string(&meds).unwrap();
        assert!(json.contains("\"createdAt\""));
        let back: Vec<Medication> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meds);

        let mut history = HistoryLog::new();
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        history.record(date, &med.id, DoseEvent::taken(Utc::now()));
        let json = serde_json::to_string(&history).unwrap();
        assert!(json.contains("\"2026-10-16\""));
        let back: HistoryLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert!(back.taken_on(date, &med.id));
    }

    #[test]
    fn test_history_is_empty_for_unmarked_days() {
        let history = HistoryLog::new();
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert!(history.day(date).is_none());
        assert!(history.events(date, "med").is_empty());
        assert!(!history.taken_on(date, "med"));
    }

    #[test]
    fn test_next_dose_display() {
        let t = DoseTime::new(9, 0).unwrap();
        assert_eq!(NextDose::Today(t).to_string(), "09:00");
        assert_eq!(NextDose::Tomorrow(t).to_string(), "Tomorrow at 09:00");
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::default(), Theme::Light);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
    }
}
