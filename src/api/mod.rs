//! Request/response operations
//!
//! [`NotificationApi`] maps each REST operation onto the registry and turns
//! the outcome into an [`ApiResponse`] carrying the HTTP status to return. It
//! does no I/O of its own, so any HTTP framework can host it.
//!
//! | Route | Method |
//! |---|---|
//! | `GET /notifications` | [`NotificationApi::list`] |
//! | `GET /notifications/unread?recipientId=` | [`NotificationApi::unread`] |
//! | `GET /notifications/{id}` | [`NotificationApi::get`] |
//! | `POST /notifications` | [`NotificationApi::create`] |
//! | `PUT /notifications/{id}` | [`NotificationApi::update`] |
//! | `PUT /notifications/{id}/mark-as-read` | [`NotificationApi::mark_as_read`] |
//! | `PUT /notifications/mark-all-as-read?recipientId=` | [`NotificationApi::mark_all_as_read`] |
//! | `DELETE /notifications/{id}` | [`NotificationApi::delete`] |

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{NewNotification, Notification, NotificationId, UpdateNotification};
use crate::registry::NotificationRegistry;
use crate::store::NotificationStore;

/// Outcome of an API operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse<T> {
    /// 200 with a body
    Ok(T),
    /// 201 with the created resource
    Created(T),
    /// 204
    NoContent,
    /// 404
    NotFound,
    /// 400 with a reason
    BadRequest(String),
    /// 500; details are logged, not returned
    ServerError,
}

impl<T> ApiResponse<T> {
    /// HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            ApiResponse::Ok(_) => 200,
            ApiResponse::Created(_) => 201,
            ApiResponse::NoContent => 204,
            ApiResponse::NotFound => 404,
            ApiResponse::BadRequest(_) => 400,
            ApiResponse::ServerError => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status())
    }

    /// Response body, if the outcome carries one
    pub fn into_body(self) -> Option<T> {
        match self {
            ApiResponse::Ok(body) | ApiResponse::Created(body) => Some(body),
            _ => None,
        }
    }

    fn from_error(error: Error) -> Self {
        match error {
            Error::NotFound(_) => ApiResponse::NotFound,
            Error::Validation(e) => ApiResponse::BadRequest(e.to_string()),
            e => {
                tracing::error!(error = %e, "Request failed");
                ApiResponse::ServerError
            }
        }
    }

    fn from_result(result: Result<T>, ok: impl FnOnce(T) -> Self) -> Self {
        result.map_or_else(Self::from_error, ok)
    }
}

/// Query string of the unread and mark-all routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UnreadQuery {
    #[serde(rename = "recipientId", default)]
    pub recipient_id: Option<String>,
}

impl UnreadQuery {
    pub fn recipient(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient_id.into()),
        }
    }
}

/// REST operations over a shared registry
pub struct NotificationApi<S: NotificationStore> {
    registry: Arc<NotificationRegistry<S>>,
}

impl<S: NotificationStore> Clone for NotificationApi<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: NotificationStore> NotificationApi<S> {
    pub fn new(registry: Arc<NotificationRegistry<S>>) -> Self {
        Self { registry }
    }

    /// `GET /notifications`
    pub async fn list(&self) -> ApiResponse<Vec<Notification>> {
        ApiResponse::from_result(self.registry.get_all().await, ApiResponse::Ok)
    }

    /// `GET /notifications/unread`
    pub async fn unread(&self, query: &UnreadQuery) -> ApiResponse<Vec<Notification>> {
        ApiResponse::from_result(
            self.registry.get_unread(query.recipient_id.as_deref()).await,
            ApiResponse::Ok,
        )
    }

    /// `GET /notifications/{id}`
    pub async fn get(&self, id: &NotificationId) -> ApiResponse<Notification> {
        match self.registry.get_by_id(id).await {
            Ok(Some(notification)) => ApiResponse::Ok(notification),
            Ok(None) => ApiResponse::NotFound,
            Err(e) => ApiResponse::from_error(e),
        }
    }

    /// `POST /notifications`
    ///
    /// Returns `Created` once the record is persisted; live delivery happens
    /// independently.
    pub async fn create(&self, input: NewNotification) -> ApiResponse<Notification> {
        ApiResponse::from_result(self.registry.create(input).await, ApiResponse::Created)
    }

    /// `PUT /notifications/{id}`
    pub async fn update(&self, id: &NotificationId, input: UpdateNotification) -> ApiResponse<()> {
        ApiResponse::from_result(self.registry.update(id, input).await, |_| ApiResponse::NoContent)
    }

    /// `PUT /notifications/{id}/mark-as-read`
    pub async fn mark_as_read(&self, id: &NotificationId) -> ApiResponse<()> {
        ApiResponse::from_result(self.registry.mark_as_read(id).await, |_| ApiResponse::NoContent)
    }

    /// `PUT /notifications/mark-all-as-read`
    pub async fn mark_all_as_read(&self, query: &UnreadQuery) -> ApiResponse<()> {
        let result = self
            .registry
            .mark_all_as_read(query.recipient_id.as_deref())
            .await
            .map(|_| ());
        ApiResponse::from_result(result, |_| ApiResponse::NoContent)
    }

    /// `DELETE /notifications/{id}`
    pub async fn delete(&self, id: &NotificationId) -> ApiResponse<()> {
        ApiResponse::from_result(self.registry.delete(id).await, |_| ApiResponse::NoContent)
    }
}
