//! Request store - guest service requests

use crate::entities::service_requests;
use crate::publisher::ChangePublisher;
use crate::types::{now_micros, RequestStatus, ServiceRequest};
use sea_orm::*;
use tracing::info;

const TABLE: &str = "service_requests";

/// Service request store
#[derive(Clone)]
pub struct RequestStore {
    db: DatabaseConnection,
    publisher: ChangePublisher,
}

impl RequestStore {
    pub fn new(db: DatabaseConnection, publisher: ChangePublisher) -> Self {
        Self { db, publisher }
    }

    /// Open a new request in `pending` state
    pub async fn create(
        &self,
        guest_id: &str,
        hotel_id: &str,
        request_type: &str,
        description: Option<String>,
    ) -> Result<ServiceRequest, DbErr> {
        let now = now_micros();
        let record = service_requests::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            guest_id: Set(guest_id.to_string()),
            hotel_id: Set(hotel_id.to_string()),
            request_type: Set(request_type.to_string()),
            description: Set(description),
            status: Set(RequestStatus::Pending.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = record.insert(&self.db).await?;
        info!(
            "Created {} request {} for guest {}",
            model.request_type, model.id, guest_id
        );

        self.publisher.inserted(TABLE, &model);
        Ok(model.into())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ServiceRequest>, DbErr> {
        let request = service_requests::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(request.map(ServiceRequest::from))
    }

    /// Move a request to `status`
    pub async fn update_status(
        &self,
        id: &str,
        status: RequestStatus,
    ) -> Result<ServiceRequest, DbErr> {
        let model = service_requests::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("service request {}", id)))?;

        let mut active: service_requests::ActiveModel = model.clone().into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(now_micros());
        let updated = active.update(&self.db).await?;
        info!("Request {} is now {}", id, status.as_str());

        self.publisher.updated(TABLE, &model, &updated);
        Ok(updated.into())
    }

    /// Requests still waiting on staff (`pending` or `in_progress`)
    pub async fn pending_count(&self, guest_id: &str) -> Result<u64, DbErr> {
        service_requests::Entity::find()
            .filter(service_requests::Column::GuestId.eq(guest_id))
            .filter(service_requests::Column::Status.is_in([
                RequestStatus::Pending.as_str(),
                RequestStatus::InProgress.as_str(),
            ]))
            .count(&self.db)
            .await
    }

    /// All requests of a guest, newest first
    pub async fn list_for_guest(&self, guest_id: &str) -> Result<Vec<ServiceRequest>, DbErr> {
        let requests = service_requests::Entity::find()
            .filter(service_requests::Column::GuestId.eq(guest_id))
            .order_by_desc(service_requests::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(requests.into_iter().map(ServiceRequest::from).collect())
    }
}
