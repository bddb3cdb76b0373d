/// Handler Module Index
///
/// One module per resource. Every handler answers with the `ApiResponse` envelope on
/// success and `ApiError` on failure.

/// Health, authentication and the router fallbacks.
pub mod public;

/// Token issuance and revocation behind the admin secret.
pub mod admin;

pub mod customers;
pub mod sites;
pub mod devices;

use uuid::Uuid;

use crate::{
    access::ResourceKind,
    error::{ApiError, ApiResult, RepoResultExt},
    models::{Customer, Device, Site},
    repository::RepositoryState,
};

// --- Shared Lookups ---

pub(crate) async fn load_customer(repo: &RepositoryState, id: Uuid) -> ApiResult<Customer> {
    repo.find_customer(id)
        .await
        .or_internal("Failed to fetch customer")?
        .ok_or_else(|| ApiError::missing(ResourceKind::Customer))
}

pub(crate) async fn load_site(repo: &RepositoryState, id: Uuid) -> ApiResult<Site> {
    repo.find_site(id)
        .await
        .or_internal("Failed to fetch site")?
        .ok_or_else(|| ApiError::missing(ResourceKind::Site))
}

/// Finds a device by serial, including soft-deleted ones.
pub(crate) async fn load_device_any(repo: &RepositoryState, serial: &str) -> ApiResult<Device> {
    repo.find_device_by_serial(serial)
        .await
        .or_internal("Failed to fetch device")?
        .ok_or_else(|| ApiError::missing(ResourceKind::Device))
}

/// Finds an active device by serial; soft-deleted devices are reported missing.
pub(crate) async fn load_device(repo: &RepositoryState, serial: &str) -> ApiResult<Device> {
    let device = load_device_any(repo, serial).await?;
    if device.deleted_at.is_some() {
        return Err(ApiError::missing(ResourceKind::Device));
    }
    Ok(device)
}

/// Rejects blank required fields with the shared "Invalid request body" message.
pub(crate) fn require_field(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(
            "Invalid request body",
            format!("{field} field is required"),
        ));
    }
    Ok(trimmed.to_string())
}
