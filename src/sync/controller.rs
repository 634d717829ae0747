use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::client::geofences::GeofenceRepository;
use crate::error::AppError;
use crate::geometry::codec::{ShapeModel, to_wire_geometry};
use crate::models::geofence::{Geofence, GeofenceDraft, GeofenceStatus};
use crate::observability::metrics::Metrics;

const RECONCILE_ATTEMPTS: u32 = 3;
const RECONCILE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Where the draft state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftPhase {
    Idle,
    Drafting,
    Submitting,
    Reconciling,
}

/// A shape mid-edit on the map. `target` is set when the draft edits an
/// existing geofence rather than creating a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub shape: ShapeModel,
    pub target: Option<String>,
}

/// Form fields supplied when the user confirms a draft.
#[derive(Debug, Clone)]
pub struct DraftAttributes {
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub status: GeofenceStatus,
    pub metadata: Option<serde_json::Value>,
}

struct EditorState {
    draft: Option<Draft>,
    /// Bumped on every `begin_draft` so a submission finishing late can
    /// tell whether the draft it captured is still the current one.
    generation: u64,
    in_flight: bool,
    reconciling: bool,
    last_error: Option<String>,
}

/// Owns the authoritative geofence collection and the draft state machine.
///
/// The collection is mutated only here: after every successful mutation the
/// controller re-lists from the server and replaces the whole collection,
/// instead of trusting the mutation response (servers normalize radii and
/// reproject polygon points). Map-rendering and list-display code read
/// snapshots.
pub struct GeofenceController {
    repo: Arc<dyn GeofenceRepository>,
    metrics: Metrics,
    geofences: RwLock<Vec<Geofence>>,
    editor: Mutex<EditorState>,
}

impl GeofenceController {
    pub fn new(repo: Arc<dyn GeofenceRepository>, metrics: Metrics) -> Self {
        Self {
            repo,
            metrics,
            geofences: RwLock::new(Vec::new()),
            editor: Mutex::new(EditorState {
                draft: None,
                generation: 0,
                in_flight: false,
                reconciling: false,
                last_error: None,
            }),
        }
    }

    /// Snapshot of the authoritative collection for rendering.
    pub fn geofences(&self) -> Vec<Geofence> {
        self.geofences.read().expect("geofence lock poisoned").clone()
    }

    pub fn phase(&self) -> DraftPhase {
        let editor = self.editor.lock().expect("editor lock poisoned");
        if editor.in_flight {
            if editor.reconciling {
                DraftPhase::Reconciling
            } else {
                DraftPhase::Submitting
            }
        } else if editor.draft.is_some() {
            DraftPhase::Drafting
        } else {
            DraftPhase::Idle
        }
    }

    pub fn current_draft(&self) -> Option<Draft> {
        self.editor.lock().expect("editor lock poisoned").draft.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.editor
            .lock()
            .expect("editor lock poisoned")
            .last_error
            .clone()
    }

    /// Start (or restart) a draft from a finalized map shape. No network
    /// calls happen until the user confirms with `submit_draft`.
    pub fn begin_draft(&self, shape: ShapeModel, target: Option<String>) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.generation += 1;
        editor.draft = Some(Draft { shape, target });
        editor.last_error = None;
    }

    /// Replace the shape of the draft in progress (map "edited" callback).
    pub fn update_draft_shape(&self, shape: ShapeModel) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        if let Some(draft) = editor.draft.as_mut() {
            draft.shape = shape;
        }
    }

    pub fn cancel_draft(&self) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.generation += 1;
        editor.draft = None;
        editor.last_error = None;
    }

    /// Initial (or manual) load of the authoritative collection.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let listed = self.repo.list().await?;
        self.replace_collection(listed);
        Ok(())
    }

    /// Confirm the draft: validate, create or update, then reconcile by
    /// re-listing. Exactly one submission may be in flight per draft; a
    /// second attempt is rejected, not queued.
    pub async fn submit_draft(&self, attrs: DraftAttributes) -> Result<(), AppError> {
        let started = Instant::now();
        let (draft, generation, body) = match self.prepare_submission(attrs) {
            Ok(prepared) => prepared,
            Err(err) => {
                if !matches!(err, AppError::SubmissionInFlight) {
                    self.record_failure(&err);
                }
                self.metrics
                    .submissions_total
                    .with_label_values(&["rejected"])
                    .inc();
                return Err(err);
            }
        };

        let mutation = match &draft.target {
            None => self.repo.create(&body).await,
            Some(id) => self.repo.update(id, &body).await,
        };

        let confirmed = match mutation {
            Ok(confirmed) => confirmed,
            Err(err) => {
                // Back to Drafting with the draft preserved, so the user
                // can retry or cancel without re-drawing.
                self.clear_in_flight();
                self.record_failure(&err);
                self.observe_submission(started, "error");
                return Err(err);
            }
        };

        info!(geofence_id = %confirmed.id, "geofence mutation acknowledged; reconciling");
        self.mark_reconciling();

        match self.reconcile().await {
            Ok(()) => {
                self.finish_submission(generation);
                self.observe_submission(started, "success");
                Ok(())
            }
            Err(err) => {
                // The mutation did persist. Keep the draft so the user can
                // retry without re-drawing, but point it at the confirmed
                // id so the retry is an idempotent update, not a second
                // create.
                self.retarget_draft(generation, &confirmed.id);
                self.record_failure(&err);
                self.observe_submission(started, "error");
                Err(err)
            }
        }
    }

    /// Delete a geofence. The local copy is removed optimistically (a
    /// failed delete is recovered by the confirming re-list), then the
    /// collection is reconciled against the server either way.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        {
            let mut fences = self.geofences.write().expect("geofence lock poisoned");
            fences.retain(|fence| fence.id != id);
            self.metrics.geofences_count.set(fences.len() as i64);
        }

        let deleted = self.repo.delete(id).await;
        let reconciled = self.reconcile().await;

        match deleted {
            Ok(()) => {
                self.metrics
                    .submissions_total
                    .with_label_values(&["success"])
                    .inc();
                reconciled
            }
            Err(err) => {
                warn!(geofence_id = %id, error = %err, "delete failed; collection re-listed");
                self.metrics
                    .submissions_total
                    .with_label_values(&["error"])
                    .inc();
                Err(err)
            }
        }
    }

    fn prepare_submission(
        &self,
        attrs: DraftAttributes,
    ) -> Result<(Draft, u64, GeofenceDraft), AppError> {
        let mut editor = self.editor.lock().expect("editor lock poisoned");

        if editor.in_flight {
            return Err(AppError::SubmissionInFlight);
        }
        let draft = editor
            .draft
            .clone()
            .ok_or_else(|| AppError::Validation("no draft in progress".to_string()))?;

        if attrs.name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".to_string()));
        }
        if attrs.kind.trim().is_empty() {
            return Err(AppError::Validation("type must not be empty".to_string()));
        }
        let geometry = to_wire_geometry(&draft.shape)?;

        let body = GeofenceDraft {
            name: attrs.name,
            description: attrs.description,
            kind: attrs.kind,
            status: attrs.status,
            geometry,
            metadata: attrs.metadata,
        };

        editor.in_flight = true;
        editor.reconciling = false;
        Ok((draft, editor.generation, body))
    }

    /// Re-list with bounded retries and replace the collection. After a
    /// successful mutation a failed list must not be swallowed into stale
    /// data, so the last error surfaces as `Reconciliation`.
    async fn reconcile(&self) -> Result<(), AppError> {
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=RECONCILE_ATTEMPTS {
            match self.repo.list().await {
                Ok(listed) => {
                    self.metrics
                        .reconcile_fetches_total
                        .with_label_values(&["success"])
                        .inc();
                    self.replace_collection(listed);
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, error = %err, "reconciliation list failed");
                    self.metrics
                        .reconcile_fetches_total
                        .with_label_values(&["error"])
                        .inc();
                    last_error = Some(err);
                    if attempt < RECONCILE_ATTEMPTS {
                        sleep(RECONCILE_RETRY_DELAY).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "list never attempted".to_string());
        Err(AppError::Reconciliation(reason))
    }

    fn replace_collection(&self, listed: Vec<Geofence>) {
        let mut fences = self.geofences.write().expect("geofence lock poisoned");
        self.metrics.geofences_count.set(listed.len() as i64);
        *fences = listed;
    }

    fn mark_reconciling(&self) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.reconciling = true;
    }

    fn clear_in_flight(&self) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.in_flight = false;
        editor.reconciling = false;
    }

    /// Close out a successful submission. The draft is cleared only if the
    /// user has not started a new one in the meantime; a reconciliation
    /// result never clobbers a newer unrelated draft.
    fn finish_submission(&self, generation: u64) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.in_flight = false;
        editor.reconciling = false;
        if editor.generation == generation {
            editor.draft = None;
            editor.last_error = None;
        }
    }

    /// Reconciliation failed after the mutation persisted: keep the draft,
    /// but aim it at the server-confirmed id so retrying cannot create a
    /// duplicate. A newer draft started in the meantime is left alone.
    fn retarget_draft(&self, generation: u64, confirmed_id: &str) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.in_flight = false;
        editor.reconciling = false;
        if editor.generation == generation {
            if let Some(draft) = editor.draft.as_mut() {
                draft.target = Some(confirmed_id.to_string());
            }
        }
    }

    fn record_failure(&self, err: &AppError) {
        let mut editor = self.editor.lock().expect("editor lock poisoned");
        editor.last_error = Some(err.to_string());
    }

    fn observe_submission(&self, started: Instant, outcome: &str) {
        self.metrics
            .submission_latency_seconds
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .submissions_total
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::{DraftAttributes, DraftPhase, GeofenceController};
    use crate::client::geofences::GeofenceRepository;
    use crate::error::AppError;
    use crate::geometry::codec::ShapeModel;
    use crate::models::geofence::{GeoPoint, Geofence, GeofenceDraft, GeofenceStatus, Geometry};
    use crate::observability::metrics::Metrics;

    fn server_fence(id: &str, name: &str) -> Geofence {
        Geofence {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            kind: "depot".to_string(),
            status: GeofenceStatus::Active,
            geometry: Geometry::Circle {
                center: GeoPoint {
                    latitude: -25.75,
                    longitude: 28.23,
                },
                radius: 500.0,
            },
            metadata: None,
            updated_at: None,
        }
    }

    fn circle_shape() -> ShapeModel {
        ShapeModel::Circle {
            center: GeoPoint {
                latitude: -25.75,
                longitude: 28.23,
            },
            radius_meters: 500.0,
        }
    }

    fn attrs(name: &str) -> DraftAttributes {
        DraftAttributes {
            name: name.to_string(),
            description: None,
            kind: "depot".to_string(),
            status: GeofenceStatus::Active,
            metadata: None,
        }
    }

    #[derive(Default)]
    struct FakeRepo {
        calls: Mutex<Vec<String>>,
        list_payload: Mutex<Vec<Geofence>>,
        list_failures_remaining: AtomicU32,
        create_fails_with_status: Mutex<Option<u16>>,
        create_gate: Mutex<Option<Arc<Notify>>>,
        recorded_drafts: Mutex<Vec<GeofenceDraft>>,
    }

    impl FakeRepo {
        fn with_list(payload: Vec<Geofence>) -> Self {
            let repo = Self::default();
            *repo.list_payload.lock().unwrap() = payload;
            repo
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GeofenceRepository for FakeRepo {
        async fn create(&self, draft: &GeofenceDraft) -> Result<Geofence, AppError> {
            self.calls.lock().unwrap().push("create".to_string());
            self.recorded_drafts.lock().unwrap().push(draft.clone());

            let gate = self.create_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            if let Some(status) = *self.create_fails_with_status.lock().unwrap() {
                return Err(AppError::Server {
                    status,
                    code: Some("duplicate_name".to_string()),
                    message: "name taken".to_string(),
                });
            }

            Ok(server_fence("gf-new", &draft.name))
        }

        async fn update(&self, id: &str, draft: &GeofenceDraft) -> Result<Geofence, AppError> {
            self.calls.lock().unwrap().push("update".to_string());
            self.recorded_drafts.lock().unwrap().push(draft.clone());
            Ok(server_fence(id, &draft.name))
        }

        async fn delete(&self, _id: &str) -> Result<(), AppError> {
            self.calls.lock().unwrap().push("delete".to_string());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Geofence>, AppError> {
            self.calls.lock().unwrap().push("list".to_string());
            if self
                .list_failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Network("connection refused".to_string()));
            }
            Ok(self.list_payload.lock().unwrap().clone())
        }
    }

    fn controller(repo: Arc<FakeRepo>) -> Arc<GeofenceController> {
        Arc::new(GeofenceController::new(repo, Metrics::new()))
    }

    #[tokio::test]
    async fn successful_submit_is_one_create_then_one_list() {
        let server_view = vec![server_fence("gf-1", "Depot A")];
        let repo = Arc::new(FakeRepo::with_list(server_view.clone()));
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        controller.submit_draft(attrs("Depot A")).await.unwrap();

        assert_eq!(repo.calls(), vec!["create", "list"]);
        assert_eq!(controller.geofences(), server_view);
        assert_eq!(controller.phase(), DraftPhase::Idle);

        let sent = repo.recorded_drafts.lock().unwrap()[0].clone();
        assert_eq!(
            sent.geometry,
            Geometry::Circle {
                center: GeoPoint {
                    latitude: -25.75,
                    longitude: 28.23,
                },
                radius: 500.0,
            }
        );
    }

    #[tokio::test]
    async fn successful_update_is_one_update_then_one_list() {
        let server_view = vec![server_fence("gf-1", "Depot A (moved)")];
        let repo = Arc::new(FakeRepo::with_list(server_view.clone()));
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), Some("gf-1".to_string()));
        controller
            .submit_draft(attrs("Depot A (moved)"))
            .await
            .unwrap();

        assert_eq!(repo.calls(), vec!["update", "list"]);
        assert_eq!(controller.geofences(), server_view);
        assert_eq!(controller.phase(), DraftPhase::Idle);

        let sent = repo.recorded_drafts.lock().unwrap()[0].clone();
        assert_eq!(sent.name, "Depot A (moved)");
        assert_eq!(
            sent.geometry,
            Geometry::Circle {
                center: GeoPoint {
                    latitude: -25.75,
                    longitude: 28.23,
                },
                radius: 500.0,
            }
        );
    }

    #[tokio::test]
    async fn collection_is_the_list_response_not_the_mutation_echo() {
        // The server view deliberately differs from what create() returned.
        let server_view = vec![server_fence("gf-1", "Depot A (normalized)")];
        let repo = Arc::new(FakeRepo::with_list(server_view.clone()));
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        controller.submit_draft(attrs("Depot A")).await.unwrap();

        assert_eq!(controller.geofences(), server_view);
    }

    #[tokio::test]
    async fn empty_name_never_reaches_the_repository() {
        let repo = Arc::new(FakeRepo::default());
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        let err = controller.submit_draft(attrs("  ")).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.calls().is_empty());
        assert_eq!(controller.phase(), DraftPhase::Drafting);
    }

    #[tokio::test]
    async fn invalid_geometry_never_reaches_the_repository() {
        let repo = Arc::new(FakeRepo::default());
        let controller = controller(repo.clone());

        controller.begin_draft(
            ShapeModel::Polygon {
                points: vec![
                    GeoPoint {
                        latitude: 0.0,
                        longitude: 0.0,
                    },
                    GeoPoint {
                        latitude: 1.0,
                        longitude: 1.0,
                    },
                ],
            },
            None,
        );
        let err = controller.submit_draft(attrs("Two points")).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidGeometry(_)));
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_rejected() {
        let repo = Arc::new(FakeRepo::default());
        let gate = Arc::new(Notify::new());
        *repo.create_gate.lock().unwrap() = Some(gate.clone());
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);

        let background = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.submit_draft(attrs("Depot A")).await })
        };
        // Let the first submission reach the gated create call.
        tokio::task::yield_now().await;
        while controller.phase() != DraftPhase::Submitting {
            tokio::task::yield_now().await;
        }

        let err = controller.submit_draft(attrs("Depot A")).await.unwrap_err();
        assert!(matches!(err, AppError::SubmissionInFlight));

        gate.notify_one();
        background.await.unwrap().unwrap();

        let creates = repo
            .calls()
            .iter()
            .filter(|call| call.as_str() == "create")
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn failed_create_preserves_the_draft_for_retry() {
        let repo = Arc::new(FakeRepo::default());
        *repo.create_fails_with_status.lock().unwrap() = Some(409);
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        let err = controller.submit_draft(attrs("Depot A")).await.unwrap_err();

        assert!(matches!(err, AppError::Server { status: 409, .. }));
        assert_eq!(repo.calls(), vec!["create"]);
        assert_eq!(controller.phase(), DraftPhase::Drafting);
        assert!(controller.current_draft().is_some());
        assert!(controller.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_failure_retries_then_surfaces() {
        let repo = Arc::new(FakeRepo::default());
        repo.list_failures_remaining
            .store(u32::MAX, Ordering::SeqCst);
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        let err = controller.submit_draft(attrs("Depot A")).await.unwrap_err();

        assert!(matches!(err, AppError::Reconciliation(_)));
        assert_eq!(repo.calls(), vec!["create", "list", "list", "list"]);

        // The draft survives for retry, aimed at the persisted geofence so
        // resubmitting cannot create a duplicate.
        let draft = controller.current_draft().unwrap();
        assert_eq!(draft.target.as_deref(), Some("gf-new"));
        assert_eq!(draft.shape, circle_shape());
        assert_eq!(controller.phase(), DraftPhase::Drafting);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_reconcile_failure_updates_instead_of_recreating() {
        let server_view = vec![server_fence("gf-new", "Depot A")];
        let repo = Arc::new(FakeRepo::with_list(server_view.clone()));
        // Exactly enough failures to exhaust the first submission's
        // reconcile attempts; the retry's list succeeds.
        repo.list_failures_remaining.store(3, Ordering::SeqCst);
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        let err = controller.submit_draft(attrs("Depot A")).await.unwrap_err();
        assert!(matches!(err, AppError::Reconciliation(_)));

        controller.submit_draft(attrs("Depot A")).await.unwrap();

        assert_eq!(
            repo.calls(),
            vec!["create", "list", "list", "list", "update", "list"]
        );
        assert_eq!(controller.geofences(), server_view);
        assert_eq!(controller.phase(), DraftPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_reconcile_failure_recovers_on_retry() {
        let server_view = vec![server_fence("gf-1", "Depot A")];
        let repo = Arc::new(FakeRepo::with_list(server_view.clone()));
        repo.list_failures_remaining.store(1, Ordering::SeqCst);
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        controller.submit_draft(attrs("Depot A")).await.unwrap();

        assert_eq!(repo.calls(), vec!["create", "list", "list"]);
        assert_eq!(controller.geofences(), server_view);
    }

    #[tokio::test]
    async fn delete_removes_optimistically_then_confirms_by_listing() {
        let before = vec![server_fence("gf-1", "Depot A"), server_fence("gf-2", "Depot B")];
        let repo = Arc::new(FakeRepo::with_list(before));
        let controller = controller(repo.clone());
        controller.refresh().await.unwrap();

        let after = vec![server_fence("gf-2", "Depot B")];
        *repo.list_payload.lock().unwrap() = after.clone();

        controller.delete("gf-1").await.unwrap();

        assert_eq!(repo.calls(), vec!["list", "delete", "list"]);
        assert_eq!(controller.geofences(), after);
    }

    #[tokio::test]
    async fn late_reconcile_never_clobbers_a_newer_draft() {
        let repo = Arc::new(FakeRepo::with_list(vec![server_fence("gf-1", "Depot A")]));
        let gate = Arc::new(Notify::new());
        *repo.create_gate.lock().unwrap() = Some(gate.clone());
        let controller = controller(repo.clone());

        controller.begin_draft(circle_shape(), None);
        let background = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.submit_draft(attrs("Depot A")).await })
        };
        while controller.phase() != DraftPhase::Submitting {
            tokio::task::yield_now().await;
        }

        // User starts an unrelated draft while the submission is in flight.
        let new_shape = ShapeModel::Circle {
            center: GeoPoint {
                latitude: 10.0,
                longitude: 10.0,
            },
            radius_meters: 50.0,
        };
        controller.begin_draft(new_shape.clone(), None);

        gate.notify_one();
        background.await.unwrap().unwrap();

        // The collection was replaced, the new draft was not.
        let draft = controller.current_draft().unwrap();
        assert_eq!(draft.shape, new_shape);
        assert_eq!(controller.geofences().len(), 1);
    }
}
