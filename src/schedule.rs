//! 복약 상태 계산 모듈
//!
//! 복약 상태(복용함/복용 시간/예정/놓침), 다음 복용 시각, 알림 대상 여부,
//! 오늘의 순응도를 현재 시각과 복용 기록으로부터 계산합니다.
//! 모든 함수는 상태를 바꾸지 않으며, 같은 입력이면 같은 결과를 돌려줍니다.

use chrono::NaiveTime;

use crate::models::{AdherenceStats, DayHistory, DoseEvent, DoseTime, Frequency, Medication, NextDose, StatusBadge};

/// 복용 시각 이후 '복용 시간' 상태로 보는 유예 시간 (분)
pub const GRACE_WINDOW_MINUTES: i64 = 60;

/// 알림 발송 허용 오차 (분)
pub const REMINDER_TOLERANCE_MINUTES: i64 = 1;

fn minutes_of(now: NaiveTime) -> i64 {
    DoseTime::from_naive(now).minutes_since_midnight()
}

/// 복약 상태 계산
///
/// 우선순위: 오늘 복용 기록 > 필요 시 복용 > 복용 시각 순차 검사.
/// 복용 시각은 오름차순으로 검사하며 처음 조건을 만족하는 시각에서 결정됩니다.
pub fn medication_status(medication: &Medication, now: NaiveTime, today_events: &[DoseEvent]) -> StatusBadge {
    if !today_events.is_empty() {
        return StatusBadge::TAKEN;
    }

    if medication.frequency.is_as_needed() {
        return StatusBadge::AS_NEEDED;
    }

    let current = minutes_of(now);

    for time in &medication.times {
        let scheduled = time.minutes_since_midnight();

        if current >= scheduled + GRACE_WINDOW_MINUTES {
            return StatusBadge::MISSED;
        } else if current >= scheduled {
            return StatusBadge::DUE_NOW;
        }
    }

    StatusBadge::UPCOMING
}

/// 다음 복용 시각 계산
///
/// 오늘 남은 복용 시각 중 가장 이른 것, 없으면 내일 첫 복용 시각.
/// 복용 여부와 무관하게 일정만 봅니다.
pub fn next_dose(medication: &Medication, now: NaiveTime) -> Option<NextDose> {
    if medication.frequency.is_as_needed() {
        return None;
    }

    let current = minutes_of(now);

    medication
        .times
        .iter()
        .find(|time| time.minutes_since_midnight() > current)
        .map(|time| NextDose::Today(*time))
        .or_else(|| medication.times.first().map(|time| NextDose::Tomorrow(*time)))
}

/// 지금 알림을 보내야 하는지 확인
///
/// 복용 시각과 현재 시각의 차이가 1분 이내면 알림 대상입니다.
/// 하루 1회 복약은 오늘 이미 복용했으면 알리지 않습니다.
/// 하루 여러 번 복용하는 복약은 이전 시간대를 복용했어도 다음 시간대에 다시 알립니다.
pub fn is_due_for_reminder(medication: &Medication, now: NaiveTime, taken_today: bool) -> bool {
    if medication.frequency.is_as_needed() {
        return false;
    }

    if taken_today && medication.frequency == Frequency::Daily {
        return false;
    }

    let current = minutes_of(now);

    medication
        .times
        .iter()
        .any(|time| (current - time.minutes_since_midnight()).abs() <= REMINDER_TOLERANCE_MINUTES)
}

/// 알림 대상 복약 목록
pub fn due_reminders<'a>(
    medications: &'a [Medication],
    now: NaiveTime,
    today: Option<&DayHistory>,
) -> Vec<&'a Medication> {
    medications
        .iter()
        .filter(|med| is_due_for_reminder(med, now, taken_in(today, &med.id)))
        .collect()
}

/// 오늘의 순응도 집계
///
/// 복용 기록이 있는 복약 수 / 전체 복약 수를 반올림한 백분율.
/// 삭제된 복약의 기록은 세지 않습니다.
pub fn adherence(medications: &[Medication], today: Option<&DayHistory>) -> AdherenceStats {
    let total_meds = medications.len();
    let taken_today = medications
        .iter()
        .filter(|med| taken_in(today, &med.id))
        .count();

    let adherence_rate = if total_meds == 0 {
        0
    } else {
        // round(100 * taken / total), 0.5는 올림
        ((200 * taken_today + total_meds) / (2 * total_meds)) as u32
    };

    AdherenceStats {
        total_meds,
        taken_today,
        adherence_rate,
    }
}

fn taken_in(today: Option<&DayHistory>, medication_id: &str) -> bool {
    today
        .and_then(|day| day.get(medication_id))
        .is_some_and(|events| !events.is_empty())
}
