//! 로컬 키-값 저장소 모듈
//!
//! 복약 목록, 복용 기록, 테마를 고정 키에 JSON으로 저장합니다.
//! 읽기 실패나 손상된 데이터는 빈 값으로 대체하고 로그만 남깁니다.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{HISTORY_KEY, MEDICATIONS_KEY, THEME_KEY};
use crate::error::AppResult;
use crate::models::{HistoryLog, Medication, Theme};

/// 키-값 저장소
pub trait KeyValueStore {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> AppResult<()>;
}

/// 메모리 저장소 (테스트, 임베딩용)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> AppResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite 저장소
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        log::info!("[저장소] DB 경로 = {:?}", path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        create_tables(&conn)?;
        Ok(Self { conn })
    }
}

fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let result = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| row.get(0));

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> AppResult<()> {
        self.conn.execute(
            r#"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn load_json<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            log::error!("[저장소] {} 읽기 실패: {}", key, e);
            return T::default();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::error!("[저장소] {} 데이터 손상, 빈 값으로 시작: {}", key, e);
        T::default()
    })
}

fn save_json<T, S>(store: &mut S, key: &str, value: &T) -> AppResult<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}

/// 복약 목록 읽기 (복용 시각 정렬 보정 포함)
///
/// 복용 시각 규칙에 맞지 않는 항목은 버리고 로그만 남깁니다.
pub fn load_medications<S: KeyValueStore + ?Sized>(store: &S) -> Vec<Medication> {
    let medications: Vec<Medication> = load_json(store, MEDICATIONS_KEY);
    medications
        .into_iter()
        .filter_map(|mut medication| match medication.normalize() {
            Ok(()) => Some(medication),
            Err(e) => {
                log::warn!("[저장소] 잘못된 복약 데이터 제외: {} ({})", medication.id, e);
                None
            }
        })
        .collect()
}

pub fn load_history<S: KeyValueStore + ?Sized>(store: &S) -> HistoryLog {
    load_json(store, HISTORY_KEY)
}

/// 테마 읽기. 값이 없거나 알 수 없으면 밝은 테마.
pub fn load_theme<S: KeyValueStore + ?Sized>(store: &S) -> Theme {
    match store.get(THEME_KEY) {
        Ok(Some(raw)) if raw == Theme::Dark.as_str() => Theme::Dark,
        Ok(_) => Theme::Light,
        Err(e) => {
            log::error!("[저장소] 테마 읽기 실패: {}", e);
            Theme::Light
        }
    }
}

/// 복약 목록과 복용 기록 저장
pub fn save_state<S: KeyValueStore + ?Sized>(
    store: &mut S,
    medications: &[Medication],
    history: &HistoryLog,
) -> AppResult<()> {
    save_json(store, MEDICATIONS_KEY, medications)?;
    save_json(store, HISTORY_KEY, history)
}

pub fn save_theme<S: KeyValueStore + ?Sized>(store: &mut S, theme: Theme) -> AppResult<()> {
    store.set(THEME_KEY, theme.as_str())
}
