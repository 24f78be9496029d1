//! In-memory storage backend.
//!
//! Single-process stand-in for the relational store: one `RwLock`-guarded
//! table set, monotonically assigned integer ids, and the same uniqueness
//! guarantees the SQL schema would enforce. Multi-statement operations
//! build their rows first and commit under one write lock, so a conflict
//! leaves nothing behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use wf_domain::chat::{ChatSession, StoredMessage};
use wf_domain::plan::{PlanDayCard, PlanSubTrip, TripPlan};
use wf_domain::poi::{Poi, PoiItem, PoiSource};
use wf_domain::prompt::PromptRecord;
use wf_domain::task::{TaskRecord, TaskStatus};
use wf_domain::trip::GeoPoint;
use wf_domain::{Error, Result};

use crate::traits::{ChatStore, NewMessage, PoiStore, PromptStore, TaskStore, TripStore};

#[derive(Default)]
struct Tables {
    trips: HashMap<i64, TripPlan>,
    pois: Vec<Poi>,
    sessions: HashMap<String, ChatSession>,
    messages: HashMap<String, Vec<StoredMessage>>,
    prompts: HashMap<String, PromptRecord>,
    tasks: HashMap<String, TaskRecord>,
}

pub struct MemoryStorage {
    tables: RwLock<Tables>,
    next_trip_id: AtomicI64,
    next_poi_id: AtomicI64,
    next_message_id: AtomicI64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_trip_id: AtomicI64::new(1),
            next_poi_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
        }
    }

    fn poi_to_item(poi: &Poi, distance_m: Option<f64>) -> PoiItem {
        PoiItem {
            id: Some(poi.id),
            provider: poi.provider.clone(),
            provider_id: poi.provider_id.clone(),
            name: poi.name.clone(),
            category: poi.category.clone(),
            addr: poi.addr.clone(),
            rating: poi.rating,
            lat: poi.geom.lat,
            lng: poi.geom.lng,
            distance_m,
            source: PoiSource::Db,
            ext: poi.ext.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TripStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl TripStore for MemoryStorage {
    async fn insert_plan(&self, plan: &TripPlan) -> Result<TripPlan> {
        // Enforce the unique keys the schema would: dense day_index per
        // trip, dense order_index per card.
        let mut seen_days = std::collections::HashSet::new();
        for card in &plan.day_cards {
            if !seen_days.insert(card.day_index) {
                return Err(Error::DbConflict(format!(
                    "duplicate (trip_id, day_index={})",
                    card.day_index
                )));
            }
            let mut seen_orders = std::collections::HashSet::new();
            for sub in &card.sub_trips {
                if !seen_orders.insert(sub.order_index) {
                    return Err(Error::DbConflict(format!(
                        "duplicate (day_card_id, order_index={}) on day {}",
                        sub.order_index, card.day_index
                    )));
                }
            }
        }

        let trip_id = self.next_trip_id.fetch_add(1, Ordering::Relaxed);
        let mut stored = plan.clone();
        stored.id = Some(trip_id);
        stored.recount();

        self.tables.write().trips.insert(trip_id, stored.clone());
        Ok(stored)
    }

    async fn fetch_trip(&self, trip_id: i64) -> Result<Option<TripPlan>> {
        let tables = self.tables.read();
        let Some(plan) = tables.trips.get(&trip_id) else {
            return Ok(None);
        };
        let mut out = plan.clone();
        out.day_cards.sort_by_key(|c: &PlanDayCard| c.day_index);
        for card in &mut out.day_cards {
            card.sub_trips.sort_by_key(|s: &PlanSubTrip| s.order_index);
        }
        Ok(Some(out))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PoiStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl PoiStore for MemoryStorage {
    async fn insert_missing_pois(&self, items: &[PoiItem]) -> Result<usize> {
        let mut tables = self.tables.write();
        let existing: std::collections::HashSet<(String, String)> =
            tables.pois.iter().map(Poi::key).collect();

        let mut inserted = 0;
        for item in items {
            let key = item.key();
            if key.1.is_empty() || existing.contains(&key) {
                continue;
            }
            // Rows with broken coordinates are skipped, not fatal.
            let Ok(geom) = GeoPoint::new(item.lat, item.lng) else {
                continue;
            };
            tables.pois.push(Poi {
                id: self.next_poi_id.fetch_add(1, Ordering::Relaxed),
                provider: item.provider.clone(),
                provider_id: item.provider_id.clone(),
                name: item.name.clone(),
                category: item.category.clone(),
                addr: item.addr.clone(),
                rating: item.rating,
                geom,
                ext: item.ext.clone(),
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn query_pois_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiItem>> {
        let tables = self.tables.read();
        let mut hits: Vec<PoiItem> = tables
            .pois
            .iter()
            .filter(|poi| category.is_none() || poi.category.as_deref() == category)
            .filter_map(|poi| {
                let d = center.distance_m(&poi.geom);
                (d <= radius_m).then(|| Self::poi_to_item(poi, Some((d * 100.0).round() / 100.0)))
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_pois_text(&self, needle: &str, limit: usize) -> Result<Vec<PoiItem>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let mut hits: Vec<&Poi> = tables
            .pois
            .iter()
            .filter(|poi| {
                poi.name.to_lowercase().contains(&needle)
                    || poi
                        .addr
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
                    || poi
                        .ext
                        .get("city")
                        .and_then(Value::as_str)
                        .is_some_and(|c| c.to_lowercase() == needle)
            })
            .collect();
        hits.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|poi| Self::poi_to_item(poi, None))
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatStore for MemoryStorage {
    async fn create_session(&self, user_id: i64, trip_id: Option<i64>) -> Result<ChatSession> {
        let session = ChatSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            trip_id,
            opened_at: Utc::now(),
            closed_at: None,
            meta: Value::Null,
        };
        self.tables
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.tables.read().sessions.get(session_id).cloned())
    }

    async fn append_turn(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<StoredMessage>> {
        let mut tables = self.tables.write();
        if !tables.sessions.contains_key(session_id) {
            return Err(Error::NotFound(format!("session {session_id}")));
        }
        let now = Utc::now();
        let mut stored = Vec::with_capacity(messages.len());
        for msg in messages {
            stored.push(StoredMessage {
                id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
                session_id: session_id.to_owned(),
                role: msg.role,
                content: msg.content,
                tokens: msg.tokens,
                created_at: now,
                meta: msg.meta,
            });
        }
        tables
            .messages
            .entry(session_id.to_owned())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let tables = self.tables.read();
        let Some(all) = tables.messages.get(session_id) else {
            return Ok(Vec::new());
        };
        let mut sorted: Vec<StoredMessage> = all.clone();
        sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let skip = sorted.len().saturating_sub(limit);
        Ok(sorted.into_iter().skip(skip).collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PromptStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl PromptStore for MemoryStorage {
    async fn get_prompt(&self, key: &str) -> Result<Option<PromptRecord>> {
        Ok(self.tables.read().prompts.get(key).cloned())
    }

    async fn put_prompt(&self, record: PromptRecord) -> Result<()> {
        self.tables
            .write()
            .prompts
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_prompt(&self, key: &str) -> Result<bool> {
        Ok(self.tables.write().prompts.remove(key).is_some())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptRecord>> {
        let mut rows: Vec<PromptRecord> = self.tables.read().prompts.values().cloned().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TaskStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl TaskStore for MemoryStorage {
    async fn insert_task(&self, record: TaskRecord) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.tasks.contains_key(&record.id) {
            return Err(Error::DbConflict(format!("task {} exists", record.id)));
        }
        tables.tasks.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tables.read().tasks.get(task_id).cloned())
    }

    async fn claim_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.get_mut(task_id) else {
            return Ok(None);
        };
        if task.status != TaskStatus::Queued {
            return Ok(None);
        }
        let now = Utc::now();
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        task.updated_at = task.updated_at.max(now);
        Ok(Some(task.clone()))
    }

    async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<Value>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::Internal(format!(
                "finish_task called with non-terminal status {status}"
            )));
        }
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.get_mut(task_id) else {
            return Ok(());
        };
        if task.status.is_terminal() {
            return Ok(());
        }
        let now = Utc::now();
        task.status = status;
        task.result = result;
        task.error = error;
        task.finished_at = Some(now);
        task.updated_at = task.updated_at.max(now);
        Ok(())
    }

    async fn cancel_queued_task(&self, task_id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Queued {
            return Ok(false);
        }
        let now = Utc::now();
        task.status = TaskStatus::Canceled;
        task.finished_at = Some(now);
        task.updated_at = task.updated_at.max(now);
        Ok(true)
    }

    async fn count_active_tasks(&self, user_id: i64, kind: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .tasks
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.kind == kind
                    && matches!(t.status, TaskStatus::Queued | TaskStatus::Running)
            })
            .count())
    }

    async fn list_unfinished_tasks(&self, kind: &str) -> Result<Vec<TaskRecord>> {
        let mut rows: Vec<TaskRecord> = self
            .tables
            .read()
            .tasks
            .values()
            .filter(|t| t.kind == kind && !t.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<TaskRecord>> {
        let mut rows: Vec<TaskRecord> = self.tables.read().tasks.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wf_domain::chat::Role;

    fn sample_plan() -> TripPlan {
        let mut plan = TripPlan {
            id: None,
            user_id: 1,
            title: "Guangzhou trip".into(),
            destination: "Guangzhou".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 2).unwrap(),
            status: "draft".into(),
            meta: Value::Null,
            day_cards: (0..2)
                .map(|day| PlanDayCard {
                    day_index: day,
                    date: NaiveDate::from_ymd_opt(2025, 12, 1 + day).unwrap(),
                    note: None,
                    sub_trips: vec![PlanSubTrip {
                        order_index: 0,
                        activity: "sightseeing".into(),
                        poi_id: None,
                        loc_name: Some("spot".into()),
                        transport: None,
                        start_time: None,
                        end_time: None,
                        lat: None,
                        lng: None,
                        ext: Value::Null,
                    }],
                })
                .collect(),
            day_count: 0,
            sub_trip_count: 0,
        };
        plan.recount();
        plan
    }

    fn poi_item(provider_id: &str, lat: f64, lng: f64, category: &str) -> PoiItem {
        PoiItem {
            id: None,
            provider: "mock".into(),
            provider_id: provider_id.into(),
            name: format!("POI {provider_id}"),
            category: Some(category.into()),
            addr: None,
            rating: Some(4.0),
            lat,
            lng,
            distance_m: None,
            source: PoiSource::Api,
            ext: Value::Null,
        }
    }

    // ── trips ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_then_fetch_preserves_structure() {
        let store = MemoryStorage::new();
        let persisted = store.insert_plan(&sample_plan()).await.unwrap();
        let trip_id = persisted.id.unwrap();

        let fetched = store.fetch_trip(trip_id).await.unwrap().unwrap();
        assert_eq!(fetched.day_cards.len(), 2);
        assert_eq!(fetched.day_cards[0].day_index, 0);
        assert_eq!(fetched.day_cards[1].day_index, 1);
        assert_eq!(fetched.sub_trip_count, 2);
    }

    #[tokio::test]
    async fn duplicate_day_index_conflicts() {
        let store = MemoryStorage::new();
        let mut plan = sample_plan();
        plan.day_cards[1].day_index = 0;
        let err = store.insert_plan(&plan).await.unwrap_err();
        assert_eq!(err.kind(), "db_conflict");
    }

    // ── pois ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_missing_skips_existing() {
        let store = MemoryStorage::new();
        let items = vec![poi_item("a", 23.13, 113.26, "food")];
        assert_eq!(store.insert_missing_pois(&items).await.unwrap(), 1);
        assert_eq!(store.insert_missing_pois(&items).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn radius_query_orders_by_distance() {
        let store = MemoryStorage::new();
        store
            .insert_missing_pois(&[
                poi_item("far", 23.20, 113.26, "food"),
                poi_item("near", 23.1301, 113.26, "food"),
            ])
            .await
            .unwrap();
        let center = GeoPoint::new(23.13, 113.26).unwrap();
        let hits = store
            .query_pois_radius(center, 20_000.0, Some("food"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].provider_id, "near");
        assert!(hits[0].distance_m.unwrap() < hits[1].distance_m.unwrap());
        assert_eq!(hits[0].source, PoiSource::Db);
    }

    #[tokio::test]
    async fn radius_query_respects_radius_and_category() {
        let store = MemoryStorage::new();
        store
            .insert_missing_pois(&[
                poi_item("close-food", 23.1301, 113.26, "food"),
                poi_item("close-sight", 23.1302, 113.26, "sight"),
            ])
            .await
            .unwrap();
        let center = GeoPoint::new(23.13, 113.26).unwrap();
        let hits = store
            .query_pois_radius(center, 500.0, Some("food"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provider_id, "close-food");
    }

    // ── chat ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn turn_append_and_history_window() {
        let store = MemoryStorage::new();
        let session = store.create_session(1, None).await.unwrap();

        for i in 0..3 {
            store
                .append_turn(
                    &session.id,
                    vec![
                        NewMessage {
                            role: Role::User,
                            content: format!("q{i}"),
                            tokens: None,
                            meta: Value::Null,
                        },
                        NewMessage {
                            role: Role::Assistant,
                            content: format!("a{i}"),
                            tokens: None,
                            meta: Value::Null,
                        },
                    ],
                )
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&session.id, 4).await.unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].content, "q1");
        assert_eq!(recent[3].content, "a2");
        // Chronological with id tiebreak: user precedes assistant.
        assert_eq!(recent[2].role, Role::User);
        assert_eq!(recent[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn append_to_unknown_session_fails() {
        let store = MemoryStorage::new();
        let err = store
            .append_turn(
                "missing",
                vec![NewMessage {
                    role: Role::User,
                    content: "x".into(),
                    tokens: None,
                    meta: Value::Null,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    // ── tasks ───────────────────────────────────────────────────────

    fn task(id: &str, user_id: i64) -> TaskRecord {
        TaskRecord::new(id.into(), user_id, "plan:deep".into(), Value::Null)
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let store = MemoryStorage::new();
        store.insert_task(task("t1", 1)).await.unwrap();

        let claimed = store.claim_task("t1").await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.started_at.is_some());

        // Second claim is a no-op (row lock semantics).
        assert!(store.claim_task("t1").await.unwrap().is_none());

        store
            .finish_task("t1", TaskStatus::Succeeded, Some(Value::Bool(true)), None)
            .await
            .unwrap();
        let done = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Succeeded);
        assert!(done.finished_at.is_some());
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn duplicate_task_id_conflicts() {
        let store = MemoryStorage::new();
        store.insert_task(task("t1", 1)).await.unwrap();
        let err = store.insert_task(task("t1", 1)).await.unwrap_err();
        assert_eq!(err.kind(), "db_conflict");
    }

    #[tokio::test]
    async fn cancel_only_while_queued() {
        let store = MemoryStorage::new();
        store.insert_task(task("t1", 1)).await.unwrap();
        assert!(store.cancel_queued_task("t1").await.unwrap());
        assert!(!store.cancel_queued_task("t1").await.unwrap());

        store.insert_task(task("t2", 1)).await.unwrap();
        store.claim_task("t2").await.unwrap();
        assert!(!store.cancel_queued_task("t2").await.unwrap());
    }

    #[tokio::test]
    async fn active_count_and_unfinished_list() {
        let store = MemoryStorage::new();
        store.insert_task(task("t1", 1)).await.unwrap();
        store.insert_task(task("t2", 1)).await.unwrap();
        store.insert_task(task("t3", 2)).await.unwrap();
        store.claim_task("t2").await.unwrap();
        store
            .finish_task("t3", TaskStatus::Failed, None, None)
            .await
            .unwrap();

        assert_eq!(store.count_active_tasks(1, "plan:deep").await.unwrap(), 2);
        assert_eq!(store.count_active_tasks(2, "plan:deep").await.unwrap(), 0);

        let unfinished = store.list_unfinished_tasks("plan:deep").await.unwrap();
        assert_eq!(unfinished.len(), 2);
        assert_eq!(unfinished[0].id, "t1");
    }

    #[tokio::test]
    async fn finish_is_idempotent_on_terminal_rows() {
        let store = MemoryStorage::new();
        store.insert_task(task("t1", 1)).await.unwrap();
        store.claim_task("t1").await.unwrap();
        store
            .finish_task("t1", TaskStatus::Succeeded, None, None)
            .await
            .unwrap();
        // A late failure report must not overwrite the terminal status.
        store
            .finish_task("t1", TaskStatus::Failed, None, Some(Value::Null))
            .await
            .unwrap();
        assert_eq!(
            store.get_task("t1").await.unwrap().unwrap().status,
            TaskStatus::Succeeded
        );
    }
}
