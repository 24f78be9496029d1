use serde_json::Value;

use wf_domain::chat::{ChatSession, Role, StoredMessage};
use wf_domain::plan::TripPlan;
use wf_domain::poi::PoiItem;
use wf_domain::prompt::PromptRecord;
use wf_domain::task::{TaskRecord, TaskStatus};
use wf_domain::trip::GeoPoint;
use wf_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trips
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait TripStore: Send + Sync {
    /// Persist a plan as trip + day cards + sub-trips in one atomic unit.
    /// Uniqueness of `(trip_id, day_index)` and `(day_card_id, order_index)`
    /// is enforced; a violation rolls the whole insert back with
    /// `Error::DbConflict`. Returns the plan enriched with assigned ids.
    async fn insert_plan(&self, plan: &TripPlan) -> Result<TripPlan>;

    /// Load a trip with its nested cards and sub-trips, cards in
    /// `day_index` order and sub-trips in `order_index` order.
    async fn fetch_trip(&self, trip_id: i64) -> Result<Option<TripPlan>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POIs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait PoiStore: Send + Sync {
    /// Insert items whose `(provider, provider_id)` is not yet present.
    /// Existing rows are never overwritten. Returns the number inserted.
    async fn insert_missing_pois(&self, items: &[PoiItem]) -> Result<usize>;

    /// Radius query around `center`, optionally filtered by category,
    /// ordered by distance ascending. `distance_m` is filled and
    /// `source` is `db` on every returned item.
    async fn query_pois_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiItem>>;

    /// Text lookup over name/addr/ext.city, rating descending. Used by the
    /// fast planner to seed candidates for a destination.
    async fn search_pois_text(&self, needle: &str, limit: usize) -> Result<Vec<PoiItem>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat sessions & messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message about to be persisted (id/timestamps assigned by the store).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub tokens: Option<u64>,
    pub meta: Value,
}

#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, user_id: i64, trip_id: Option<i64>) -> Result<ChatSession>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>>;

    /// Atomically append the messages of one turn. Stream chunks are never
    /// persisted; a failed turn may persist the user message alone.
    async fn append_turn(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<StoredMessage>>;

    /// The most recent messages of a session in chronological order
    /// (`created_at` ascending, id as tiebreak).
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait PromptStore: Send + Sync {
    async fn get_prompt(&self, key: &str) -> Result<Option<PromptRecord>>;

    async fn put_prompt(&self, record: PromptRecord) -> Result<()>;

    /// Remove an override. Returns whether a row existed.
    async fn delete_prompt(&self, key: &str) -> Result<bool>;

    async fn list_prompts(&self) -> Result<Vec<PromptRecord>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new queued row; `Error::DbConflict` when the id exists.
    async fn insert_task(&self, record: TaskRecord) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// Claim a queued task: transition `queued → running` and stamp
    /// `started_at`. Returns `None` when the row is missing or no longer
    /// queued — the worker skips it. This is the row-lock point that keeps
    /// two workers off the same task.
    async fn claim_task(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// Terminal transition with sanitized result/error payloads.
    async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<Value>,
    ) -> Result<()>;

    /// `queued → canceled`; false when the task was not queued.
    async fn cancel_queued_task(&self, task_id: &str) -> Result<bool>;

    /// Queued + running tasks of one user for one kind.
    async fn count_active_tasks(&self, user_id: i64, kind: &str) -> Result<usize>;

    /// All non-terminal tasks of a kind, oldest first (restart recovery).
    async fn list_unfinished_tasks(&self, kind: &str) -> Result<Vec<TaskRecord>>;

    /// Most recent tasks, newest first (admin summaries).
    async fn recent_tasks(&self, limit: usize) -> Result<Vec<TaskRecord>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bundle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the gateway needs behind one `Arc<dyn Storage>`.
pub trait Storage:
    TripStore + PoiStore + ChatStore + PromptStore + TaskStore + Send + Sync
{
}

impl<T> Storage for T where
    T: TripStore + PoiStore + ChatStore + PromptStore + TaskStore + Send + Sync
{
}
