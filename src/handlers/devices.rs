use axum::extract::{Path, State};

use super::{load_customer, load_device, load_device_any, load_site, require_field};
use crate::{
    access::{ResourceKind, Upsert, create_or_restore, parse_id},
    auth::Session,
    error::{ApiError, ApiResult, RepoResultExt},
    models::{Device, DeviceRequest, DeviceResponse, DeviceStatus, DeviceStatusRequest},
    repository::{RepoError, RepositoryState},
    response::{ApiResponse, JsonBody},
};

fn device_list(devices: &[Device]) -> Vec<DeviceResponse> {
    devices.iter().map(DeviceResponse::from).collect()
}

/// create_device
///
/// [Admin Route] Registers a device on a site of the given customer, or restores a
/// soft-deleted device with the same serial number on that site.
#[utoipa::path(
    post,
    path = "/customers/{customer_id}/sites/{site_id}/devices",
    tag = "devices",
    request_body = DeviceRequest,
    params(
        ("customer_id" = String, Path, description = "Customer UUID"),
        ("site_id" = String, Path, description = "Site UUID")
    ),
    responses(
        (status = 201, description = "Device created", body = DeviceResponse),
        (status = 200, description = "Device restored", body = DeviceResponse),
        (status = 400, description = "Device already exists"),
        (status = 403, description = "Site does not belong to the customer"),
        (status = 404, description = "Customer or site not found")
    )
)]
pub async fn create_device(
    State(repo): State<RepositoryState>,
    Path((customer_id, site_id)): Path<(String, String)>,
    JsonBody(mut body): JsonBody<DeviceRequest>,
) -> ApiResult<ApiResponse<DeviceResponse>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    let site_id = parse_id(&site_id, ResourceKind::Site)?;
    body.device_serial_number = require_field(&body.device_serial_number, "Device serial number")?;

    let customer = load_customer(&repo, customer_id).await?;
    let site = load_site(&repo, site_id).await?;
    if site.customer_id != customer.id {
        return Err(ApiError::forbidden(
            "Forbidden",
            "There is no site with the given ID for the given customer",
        ));
    }

    let existing = repo
        .find_device_by_serial(&body.device_serial_number)
        .await
        .or_internal("Failed to fetch device")?;
    // Site references are immutable; a deleted device elsewhere keeps its serial reserved.
    if existing.as_ref().is_some_and(|device| device.site_id != site.id) {
        return Err(ApiError::already_exists(ResourceKind::Device));
    }

    let outcome = create_or_restore(
        existing,
        || repo.insert_device(site.id, &body),
        |id| repo.restore_device(id),
    )
    .await?;

    Ok(match outcome {
        Upsert::Created(device) => {
            tracing::info!(serial = %device.device_serial_number, site_id = %site.id, "device created");
            ApiResponse::created("Device created", DeviceResponse::from(&device))
        }
        Upsert::Restored(device) => {
            tracing::info!(serial = %device.device_serial_number, site_id = %site.id, "device restored");
            ApiResponse::ok("Device restored", DeviceResponse::from(&device))
        }
    })
}

/// list_devices
///
/// [Session Route] Admins see every active device; user tokens see their customer's.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    responses((status = 200, description = "Devices fetched", body = [DeviceResponse]))
)]
pub async fn list_devices(
    session: Session,
    State(repo): State<RepositoryState>,
) -> ApiResult<ApiResponse<Vec<DeviceResponse>>> {
    let result = if session.is_admin() {
        repo.list_devices().await
    } else {
        repo.list_devices_for_customer(session.subject_id).await
    };
    let devices = result.or_internal("Failed to fetch devices")?;

    Ok(ApiResponse::ok("Devices fetched", device_list(&devices)))
}

/// list_customer_devices
///
/// [Session Route] Active devices across every site of one customer. Owner or admin.
#[utoipa::path(
    get,
    path = "/customers/{customer_id}/devices",
    tag = "devices",
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 200, description = "Devices fetched", body = [DeviceResponse]),
        (status = 403, description = "Not the caller's customer"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn list_customer_devices(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<DeviceResponse>>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    session.ensure_owner(customer_id)?;
    let customer = load_customer(&repo, customer_id).await?;

    let devices = repo
        .list_devices_for_customer(customer.id)
        .await
        .or_internal("Failed to fetch devices")?;
    Ok(ApiResponse::ok("Devices fetched", device_list(&devices)))
}

/// list_site_devices
///
/// [Session Route] Active devices of one site. Owner or admin.
#[utoipa::path(
    get,
    path = "/sites/{site_id}/devices",
    tag = "devices",
    params(("site_id" = String, Path, description = "Site UUID")),
    responses(
        (status = 200, description = "Devices fetched", body = [DeviceResponse]),
        (status = 403, description = "Site belongs to another customer"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn list_site_devices(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(site_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<DeviceResponse>>> {
    let site_id = parse_id(&site_id, ResourceKind::Site)?;
    let site = load_site(&repo, site_id).await?;
    session.ensure_can_read(&site)?;

    let devices = repo
        .list_devices_for_site(site.id)
        .await
        .or_internal("Failed to fetch devices")?;
    Ok(ApiResponse::ok("Devices fetched", device_list(&devices)))
}

/// get_device
///
/// [Session Route] Fetches a device by serial number. Soft-deleted devices are still
/// returned here. Owner or admin.
#[utoipa::path(
    get,
    path = "/devices/{serial}",
    tag = "devices",
    params(("serial" = String, Path, description = "Device serial number")),
    responses(
        (status = 200, description = "Device fetched", body = DeviceResponse),
        (status = 403, description = "Device belongs to another customer"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn get_device(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(serial): Path<String>,
) -> ApiResult<ApiResponse<DeviceResponse>> {
    let device = load_device_any(&repo, &serial).await?;
    session.ensure_can_read(&device)?;
    Ok(ApiResponse::ok("Device fetched", DeviceResponse::from(&device)))
}

/// update_device
///
/// [Admin Route] Overwrites the mutable fields of an active device. A blank serial
/// number in the body keeps the current one.
#[utoipa::path(
    put,
    path = "/devices/{serial}",
    tag = "devices",
    request_body = DeviceRequest,
    params(("serial" = String, Path, description = "Device serial number")),
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 400, description = "Serial number taken"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn update_device(
    State(repo): State<RepositoryState>,
    Path(serial): Path<String>,
    JsonBody(mut body): JsonBody<DeviceRequest>,
) -> ApiResult<ApiResponse<DeviceResponse>> {
    let device = load_device(&repo, &serial).await?;
    body.device_serial_number = match body.device_serial_number.trim() {
        "" => device.device_serial_number.clone(),
        new_serial => new_serial.to_string(),
    };

    let updated = match repo.update_device(device.id, &body).await {
        Ok(Some(updated)) => updated,
        Ok(None) => return Err(ApiError::missing(ResourceKind::Device)),
        Err(RepoError::Conflict(_)) => return Err(ApiError::already_exists(ResourceKind::Device)),
        Err(e) => return Err(ApiError::internal("Failed to update device", e)),
    };

    tracing::info!(serial = %updated.device_serial_number, "device updated");
    Ok(ApiResponse::ok("Device updated", DeviceResponse::from(&updated)))
}

/// delete_device
///
/// [Admin Route] Soft-deletes a device.
#[utoipa::path(
    delete,
    path = "/devices/{serial}",
    tag = "devices",
    params(("serial" = String, Path, description = "Device serial number")),
    responses(
        (status = 200, description = "Device deleted"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn delete_device(
    State(repo): State<RepositoryState>,
    Path(serial): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let device = load_device(&repo, &serial).await?;

    if !repo.soft_delete_device(device.id).await.or_internal("Failed to delete device")? {
        return Err(ApiError::missing(ResourceKind::Device));
    }

    tracing::info!(%serial, "device deleted");
    Ok(ApiResponse::message("Device deleted"))
}

/// list_device_statuses
///
/// [Session Route] Status history of a device, newest first. Owner or admin.
#[utoipa::path(
    get,
    path = "/devices/{serial}/statuses",
    tag = "devices",
    params(("serial" = String, Path, description = "Device serial number")),
    responses(
        (status = 200, description = "Device statuses fetched", body = [DeviceStatus]),
        (status = 403, description = "Device belongs to another customer"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn list_device_statuses(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(serial): Path<String>,
) -> ApiResult<ApiResponse<Vec<DeviceStatus>>> {
    let device = load_device_any(&repo, &serial).await?;
    session.ensure_can_read(&device)?;

    let statuses = repo
        .list_device_statuses(device.id)
        .await
        .or_internal("Failed to fetch device statuses")?;
    Ok(ApiResponse::ok("Device statuses fetched", statuses))
}

/// record_device_status
///
/// [Admin Route] Appends a status report to an active device.
#[utoipa::path(
    post,
    path = "/devices/{serial}/statuses",
    tag = "devices",
    request_body = DeviceStatusRequest,
    params(("serial" = String, Path, description = "Device serial number")),
    responses(
        (status = 201, description = "Device status recorded", body = DeviceStatus),
        (status = 400, description = "Status missing"),
        (status = 404, description = "Device not found")
    )
)]
pub async fn record_device_status(
    State(repo): State<RepositoryState>,
    Path(serial): Path<String>,
    JsonBody(body): JsonBody<DeviceStatusRequest>,
) -> ApiResult<ApiResponse<DeviceStatus>> {
    let status = require_field(&body.status, "Status")?;
    let device = load_device(&repo, &serial).await?;

    let record = repo
        .record_device_status(device.id, &status, body.detail.as_deref())
        .await
        .or_internal("Failed to record device status")?;

    tracing::debug!(%serial, %status, "device status recorded");
    Ok(ApiResponse::created("Device status recorded", record))
}
