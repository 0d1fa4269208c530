use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{transitions, Caller, WorkflowError};
use crate::dispatch::Dispatcher;
use crate::domain::activity::actions;
use crate::domain::{
    ActivityLog, Actor, CreateRfpRequest, DomainEvent, PublishedRfpView, Rfp, RfpStatus,
    StatusChanged, SupplierResponse, SupplierResponseView, UpdateRfpRequest, MAX_TITLE_LEN,
};
use crate::services::search::SearchQuery;
use crate::store::{RfpFilter, RfpStore, RfpTransaction};

/// RFP status state machine over a repository and a dispatcher
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn RfpStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn RfpStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Create an RFP in `DRAFT` owned by the caller.
    pub async fn create(
        &self,
        caller: &Caller,
        request: CreateRfpRequest,
    ) -> Result<Rfp, WorkflowError> {
        if !caller.is_buyer() {
            return Err(WorkflowError::Validation(
                "only buyers can create RFPs".to_string(),
            ));
        }
        let title = request.title.trim();
        validate_title(title)?;

        let now = Utc::now();
        let rfp = Rfp {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: request.description,
            requirements: request.requirements,
            status: RfpStatus::Draft,
            owner_id: caller.id,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.save_rfp(&rfp).await?;
        tx.append_activity(&ActivityLog::new(
            rfp.id,
            Some(caller.id),
            actions::CREATED,
            Some(format!("Created RFP '{}'", rfp.title)),
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(rfp_id = %rfp.id, owner_id = %caller.id, "RFP created");
        self.dispatcher.dispatch(DomainEvent::RfpCreated {
            rfp_id: rfp.id,
            owner_id: caller.id,
        });
        Ok(rfp)
    }

    /// Move an RFP to `target` on behalf of its owner.
    ///
    /// Checks run in order: existence, ownership, table legality, then the
    /// compare-and-set on the stored status inside the transaction.
    pub async fn request_transition(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
        target: RfpStatus,
    ) -> Result<Rfp, WorkflowError> {
        let rfp = self.load(rfp_id).await?;
        if rfp.owner_id != caller.id {
            return Err(WorkflowError::Forbidden(
                "only the owner can change the status of this RFP".to_string(),
            ));
        }

        let owner_email = self.owner_email(&rfp).await?;
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let (updated, event) = transition_within(
            tx.as_mut(),
            &rfp,
            target,
            Actor::User(caller.id),
            owner_email,
            now,
        )
        .await?;
        tx.commit().await?;

        self.emit(event);
        Ok(updated)
    }

    /// Record a supplier response and take the RFP from `PUBLISHED` to
    /// `RESPONSE_SUBMITTED` in the same transaction.
    pub async fn submit_response(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
        content: Option<String>,
    ) -> Result<SupplierResponse, WorkflowError> {
        if !caller.is_supplier() {
            return Err(WorkflowError::Forbidden(
                "only suppliers can respond to RFPs".to_string(),
            ));
        }
        let rfp = self.load(rfp_id).await?;
        if rfp.status != RfpStatus::Published {
            return Err(WorkflowError::InvalidState(format!(
                "cannot respond to an RFP in status {}; it must be PUBLISHED",
                rfp.status
            )));
        }

        let owner_email = self.owner_email(&rfp).await?;
        let now = Utc::now();
        let response = SupplierResponse {
            id: Uuid::new_v4(),
            rfp_id,
            supplier_id: caller.id,
            content: content.unwrap_or_default(),
            created_at: now,
        };

        let mut tx = self.store.begin().await?;
        let (_, event) = transition_within(
            tx.as_mut(),
            &rfp,
            RfpStatus::ResponseSubmitted,
            Actor::System,
            owner_email,
            now,
        )
        .await?;
        tx.insert_response(&response).await?;
        tx.append_activity(&ActivityLog::new(
            rfp_id,
            Some(caller.id),
            actions::RESPONSE_SUBMITTED,
            None,
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(rfp_id = %rfp_id, supplier_id = %caller.id, response_id = %response.id, "Response submitted");
        self.emit(event);
        Ok(response)
    }

    /// Replace the provided content fields. Allowed for the owner while the
    /// RFP is `DRAFT` or `PUBLISHED`.
    pub async fn update_content(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
        update: UpdateRfpRequest,
    ) -> Result<Rfp, WorkflowError> {
        let rfp = self.load(rfp_id).await?;
        if rfp.owner_id != caller.id {
            return Err(WorkflowError::Forbidden(
                "only the owner can update this RFP".to_string(),
            ));
        }
        if !rfp.status.is_content_editable() {
            return Err(WorkflowError::InvalidState(format!(
                "content cannot be edited in status {}",
                rfp.status
            )));
        }

        let mut content = update.apply_to(&rfp.content());
        content.title = content.title.trim().to_string();
        validate_title(&content.title)?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let updated = tx
            .update_content(rfp_id, rfp.status, &content, now)
            .await?
            .ok_or_else(|| concurrent_change(rfp_id))?;
        tx.append_activity(&ActivityLog::new(
            rfp_id,
            Some(caller.id),
            actions::CONTENT_UPDATED,
            None,
            now,
        ))
        .await?;
        tx.commit().await?;

        debug!(rfp_id = %rfp_id, "RFP content updated");
        self.dispatcher.dispatch(DomainEvent::RfpContentUpdated {
            rfp_id,
            actor_id: caller.id,
        });
        Ok(updated)
    }

    /// Fetch an RFP visible to the caller. Drafts are visible to their owner only.
    pub async fn get(&self, rfp_id: Uuid, caller: &Caller) -> Result<Rfp, WorkflowError> {
        let rfp = self.load(rfp_id).await?;
        if rfp.owner_id != caller.id && rfp.status == RfpStatus::Draft {
            return Err(WorkflowError::NotFound("RFP"));
        }
        Ok(rfp)
    }

    /// Buyers list their own RFPs; suppliers list published ones.
    pub async fn list(
        &self,
        caller: &Caller,
        title_contains: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rfp>, i64), WorkflowError> {
        let filter = RfpFilter {
            owner_id: caller.is_buyer().then_some(caller.id),
            status: caller.is_supplier().then_some(RfpStatus::Published),
            title_contains: title_contains.filter(|q| !q.trim().is_empty()),
        };
        Ok(self.store.find_rfps(&filter, limit, offset).await?)
    }

    /// Full-text search over the projection, scoped like [`list`](Self::list).
    pub async fn search(
        &self,
        caller: &Caller,
        text: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rfp>, i64), WorkflowError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::Validation("search query must not be empty".to_string()));
        }
        let query = SearchQuery {
            text: text.to_string(),
            owner_id: caller.is_buyer().then_some(caller.id),
            status: caller.is_supplier().then_some(RfpStatus::Published),
            limit,
            offset,
        };
        Ok(self.store.search_rfps(&query).await?)
    }

    /// Delete an RFP and everything it owns.
    pub async fn delete(&self, rfp_id: Uuid, caller: &Caller) -> Result<(), WorkflowError> {
        let rfp = self.load(rfp_id).await?;
        if rfp.owner_id != caller.id {
            return Err(WorkflowError::Forbidden(
                "only the owner can delete this RFP".to_string(),
            ));
        }
        if !self.store.delete_rfp(rfp_id).await? {
            return Err(WorkflowError::NotFound("RFP"));
        }
        info!(rfp_id = %rfp_id, "RFP deleted");
        Ok(())
    }

    pub async fn list_responses(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
    ) -> Result<Vec<SupplierResponse>, WorkflowError> {
        self.load_owned(rfp_id, caller).await?;
        Ok(self.store.list_responses(rfp_id).await?)
    }

    pub async fn list_activity(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
    ) -> Result<Vec<ActivityLog>, WorkflowError> {
        self.load_owned(rfp_id, caller).await?;
        Ok(self.store.list_activity(rfp_id).await?)
    }

    /// The caller's own responses, newest first
    pub async fn supplier_responses(
        &self,
        caller: &Caller,
    ) -> Result<Vec<SupplierResponseView>, WorkflowError> {
        if !caller.is_supplier() {
            return Err(WorkflowError::Forbidden("suppliers only".to_string()));
        }
        Ok(self.store.list_supplier_responses(caller.id).await?)
    }

    /// Published RFPs with owner contact, for suppliers
    pub async fn published_with_owners(
        &self,
        caller: &Caller,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<PublishedRfpView>, i64), WorkflowError> {
        if !caller.is_supplier() {
            return Err(WorkflowError::Forbidden("suppliers only".to_string()));
        }
        let filter = RfpFilter {
            status: Some(RfpStatus::Published),
            ..Default::default()
        };
        let (rfps, total) = self.store.find_rfps(&filter, limit, offset).await?;

        let mut views = Vec::with_capacity(rfps.len());
        for rfp in rfps {
            let email = self
                .store
                .find_user(rfp.owner_id)
                .await?
                .map(|u| u.email)
                .unwrap_or_default();
            views.push(PublishedRfpView {
                id: rfp.id,
                title: rfp.title,
                description: rfp.description,
                requirements: rfp.requirements,
                status: rfp.status,
                created_at: rfp.created_at,
                owner: crate::domain::OwnerRef {
                    id: rfp.owner_id,
                    email,
                },
            });
        }
        Ok((views, total))
    }

    async fn load(&self, rfp_id: Uuid) -> Result<Rfp, WorkflowError> {
        self.store
            .get_rfp(rfp_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFP"))
    }

    async fn owner_email(&self, rfp: &Rfp) -> Result<Option<String>, WorkflowError> {
        Ok(self.store.find_user(rfp.owner_id).await?.map(|u| u.email))
    }

    async fn load_owned(&self, rfp_id: Uuid, caller: &Caller) -> Result<Rfp, WorkflowError> {
        let rfp = self.load(rfp_id).await?;
        if rfp.owner_id != caller.id {
            return Err(WorkflowError::Forbidden(
                "only the owner can view this".to_string(),
            ));
        }
        Ok(rfp)
    }

    fn emit(&self, event: StatusChanged) {
        info!(
            rfp_id = %event.rfp_id,
            from = %event.from,
            to = %event.to,
            actor = ?event.actor,
            "RFP status changed"
        );
        self.dispatcher.dispatch(DomainEvent::StatusChanged(event));
    }
}

fn validate_title(title: &str) -> Result<(), WorkflowError> {
    if title.is_empty() {
        return Err(WorkflowError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(WorkflowError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn concurrent_change(rfp_id: Uuid) -> WorkflowError {
    WorkflowError::Conflict(format!("RFP {} was modified concurrently, retry", rfp_id))
}

/// Validate and apply one transition inside an open transaction.
async fn transition_within(
    tx: &mut dyn RfpTransaction,
    current: &Rfp,
    to: RfpStatus,
    actor: Actor,
    owner_email: Option<String>,
    at: DateTime<Utc>,
) -> Result<(Rfp, StatusChanged), WorkflowError> {
    if !transitions::is_allowed(current.status, to) {
        return Err(WorkflowError::InvalidTransition {
            from: current.status,
            to,
        });
    }

    let updated = tx
        .compare_and_set_status(current.id, current.status, to, at)
        .await?
        .ok_or_else(|| concurrent_change(current.id))?;

    tx.append_activity(&ActivityLog::new(
        current.id,
        actor.user_id(),
        actions::STATUS_CHANGED,
        Some(format!("{} -> {}", current.status, to)),
        at,
    ))
    .await?;

    let event = StatusChanged {
        rfp_id: current.id,
        from: current.status,
        to,
        actor,
        occurred_at: at,
        title: updated.title.clone(),
        owner_email,
    };
    Ok((updated, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::domain::Role;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        events: Arc<RecordingDispatcher>,
        engine: WorkflowEngine,
        buyer: Caller,
        supplier: Caller,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingDispatcher::default());
        let engine = WorkflowEngine::new(store.clone(), events.clone());
        Fixture {
            store,
            events,
            engine,
            buyer: Caller::new(Uuid::new_v4(), Role::Buyer),
            supplier: Caller::new(Uuid::new_v4(), Role::Supplier),
        }
    }

    fn request(title: &str) -> CreateRfpRequest {
        CreateRfpRequest {
            title: title.to_string(),
            description: Some("Office fit-out".to_string()),
            requirements: None,
        }
    }

    /// Drive an RFP to `target` along the shortest owner path.
    async fn rfp_in(f: &Fixture, target: RfpStatus) -> Rfp {
        let rfp = f.engine.create(&f.buyer, request("Fit-out")).await.unwrap();
        let path: &[RfpStatus] = match target {
            RfpStatus::Draft => &[],
            RfpStatus::Published => &[RfpStatus::Published],
            RfpStatus::ResponseSubmitted => {
                f.engine
                    .request_transition(rfp.id, &f.buyer, RfpStatus::Published)
                    .await
                    .unwrap();
                f.engine
                    .submit_response(rfp.id, &f.supplier, Some("offer".into()))
                    .await
                    .unwrap();
                &[]
            }
            RfpStatus::UnderReview => &[RfpStatus::Published, RfpStatus::UnderReview],
            RfpStatus::Approved => &[
                RfpStatus::Published,
                RfpStatus::UnderReview,
                RfpStatus::Approved,
            ],
            RfpStatus::Rejected => &[
                RfpStatus::Published,
                RfpStatus::UnderReview,
                RfpStatus::Rejected,
            ],
        };
        for step in path {
            f.engine
                .request_transition(rfp.id, &f.buyer, *step)
                .await
                .unwrap();
        }
        f.store.get_rfp(rfp.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn create_starts_in_draft_and_schedules_indexing() {
        let f = fixture();
        let rfp = f.engine.create(&f.buyer, request("  Desks  ")).await.unwrap();

        assert_eq!(rfp.status, RfpStatus::Draft);
        assert_eq!(rfp.title, "Desks");
        assert_eq!(rfp.owner_id, f.buyer.id);
        assert_eq!(
            f.events.events(),
            vec![DomainEvent::RfpCreated {
                rfp_id: rfp.id,
                owner_id: f.buyer.id
            }]
        );
        let activity = f.store.list_activity(rfp.id).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].action, actions::CREATED);
    }

    #[tokio::test]
    async fn create_rejects_empty_title_and_suppliers() {
        let f = fixture();
        assert!(matches!(
            f.engine.create(&f.buyer, request("   ")).await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            f.engine.create(&f.supplier, request("Desks")).await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(f.events.events().is_empty());
    }

    #[tokio::test]
    async fn titles_are_capped_at_column_width() {
        let f = fixture();
        let too_long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(
            f.engine.create(&f.buyer, request(&too_long)).await,
            Err(WorkflowError::Validation(_))
        ));

        // Counted in characters, not bytes
        let widest = "é".repeat(MAX_TITLE_LEN);
        let rfp = f.engine.create(&f.buyer, request(&widest)).await.unwrap();
        assert_eq!(rfp.title, widest);

        let update = UpdateRfpRequest {
            title: Some(too_long),
            ..Default::default()
        };
        assert!(matches!(
            f.engine.update_content(rfp.id, &f.buyer, update).await,
            Err(WorkflowError::Validation(_))
        ));
        let stored = f.store.get_rfp(rfp.id).await.unwrap().unwrap();
        assert_eq!(stored.title, widest);
    }

    #[tokio::test]
    async fn illegal_transitions_leave_status_unchanged() {
        for from in RfpStatus::ALL {
            for to in RfpStatus::ALL {
                if transitions::is_allowed(from, to) {
                    continue;
                }
                let f = fixture();
                let rfp = rfp_in(&f, from).await;
                let before = f.store.list_activity(rfp.id).await.unwrap().len();

                let err = f
                    .engine
                    .request_transition(rfp.id, &f.buyer, to)
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, WorkflowError::InvalidTransition { from: a, to: b } if a == from && b == to),
                    "{} -> {}: {:?}",
                    from,
                    to,
                    err
                );

                let after = f.store.get_rfp(rfp.id).await.unwrap().unwrap();
                assert_eq!(after.status, from);
                assert_eq!(f.store.list_activity(rfp.id).await.unwrap().len(), before);
            }
        }
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_for_any_target() {
        let f = fixture();
        let other = Caller::new(Uuid::new_v4(), Role::Buyer);
        let rfp = rfp_in(&f, RfpStatus::Published).await;

        for target in RfpStatus::ALL {
            assert!(matches!(
                f.engine.request_transition(rfp.id, &other, target).await,
                Err(WorkflowError::Forbidden(_))
            ));
            assert!(matches!(
                f.engine
                    .request_transition(rfp.id, &f.supplier, target)
                    .await,
                Err(WorkflowError::Forbidden(_))
            ));
        }
        assert!(matches!(
            f.engine
                .update_content(rfp.id, &other, UpdateRfpRequest::default())
                .await,
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn missing_rfp_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.engine
                .request_transition(Uuid::new_v4(), &f.buyer, RfpStatus::Published)
                .await,
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn response_to_draft_is_invalid_state() {
        let f = fixture();
        let rfp = rfp_in(&f, RfpStatus::Draft).await;

        let err = f
            .engine
            .submit_response(rfp.id, &f.supplier, Some("offer".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
        assert!(f.store.list_responses(rfp.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_response_moves_to_response_submitted() {
        let f = fixture();
        let rfp = rfp_in(&f, RfpStatus::Published).await;

        let response = f
            .engine
            .submit_response(rfp.id, &f.supplier, Some("offer text".into()))
            .await
            .unwrap();
        assert_eq!(response.content, "offer text");

        let stored = f.store.get_rfp(rfp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RfpStatus::ResponseSubmitted);
        assert_eq!(f.store.list_responses(rfp.id).await.unwrap().len(), 1);

        let last = f.events.events().pop().unwrap();
        match last {
            DomainEvent::StatusChanged(change) => {
                assert_eq!(change.from, RfpStatus::Published);
                assert_eq!(change.to, RfpStatus::ResponseSubmitted);
                assert_eq!(change.actor, Actor::System);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // A second response no longer finds the RFP published
        assert!(matches!(
            f.engine.submit_response(rfp.id, &f.supplier, None).await,
            Err(WorkflowError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn content_editable_only_while_open() {
        let f = fixture();
        let rfp = rfp_in(&f, RfpStatus::Published).await;
        let update = UpdateRfpRequest {
            title: Some("Standing desks".into()),
            ..Default::default()
        };
        let updated = f
            .engine
            .update_content(rfp.id, &f.buyer, update.clone())
            .await
            .unwrap();
        assert_eq!(updated.title, "Standing desks");
        assert_eq!(updated.status, RfpStatus::Published);
        assert!(matches!(
            f.events.events().last(),
            Some(DomainEvent::RfpContentUpdated { .. })
        ));

        let closed = rfp_in(&f, RfpStatus::UnderReview).await;
        assert!(matches!(
            f.engine.update_content(closed.id, &f.buyer, update).await,
            Err(WorkflowError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn suppliers_cannot_see_drafts() {
        let f = fixture();
        let rfp = rfp_in(&f, RfpStatus::Draft).await;
        assert!(f.engine.get(rfp.id, &f.buyer).await.is_ok());
        assert!(matches!(
            f.engine.get(rfp.id, &f.supplier).await,
            Err(WorkflowError::NotFound(_))
        ));

        let (items, total) = f.engine.list(&f.supplier, None, 10, 0).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn concurrent_approve_and_reject_serialize() {
        let f = fixture();
        let rfp = rfp_in(&f, RfpStatus::UnderReview).await;

        let approve = f
            .engine
            .request_transition(rfp.id, &f.buyer, RfpStatus::Approved);
        let reject = f
            .engine
            .request_transition(rfp.id, &f.buyer, RfpStatus::Rejected);
        let (a, b) = tokio::join!(approve, reject);

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        for result in &outcomes {
            if let Err(e) = result {
                assert!(matches!(
                    e,
                    WorkflowError::Conflict(_) | WorkflowError::InvalidTransition { .. }
                ));
            }
        }
        let status_changes = f
            .store
            .list_activity(rfp.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.details.as_deref().is_some_and(|d| d.starts_with("UNDER_REVIEW")))
            .count();
        assert_eq!(status_changes, 1);
    }
}
