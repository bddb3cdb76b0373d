use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Persisted Rows ---

/// Customer
///
/// A row of the `customers` table. The name is the natural key: a soft-deleted customer
/// is restored rather than duplicated when the same name is created again.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Site
///
/// A row of the `sites` table joined with the owning customer's name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Site {
    pub id: Uuid,
    // FK to customers.id, fixed at creation.
    pub customer_id: Uuid,
    pub customer_name: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Device
///
/// A row of the `devices` table joined through its site to the owning customer.
/// `device_serial_number` is globally unique and is the lookup key for every
/// device route.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Device {
    pub id: Uuid,
    // FK to sites.id, fixed at creation.
    pub site_id: Uuid,
    pub site_name: String,
    // Resolved through the site; the ownership chain for access checks.
    pub customer_id: Uuid,
    pub customer_name: String,
    pub gateway: String,
    pub controller: String,
    pub controller_serial_number: String,
    pub device_type: String,
    pub device_name: String,
    pub device_serial_number: String,
    pub building_url: String,
    pub auth_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// DeviceStatus
///
/// A status report recorded against a device (`device_statuses` table).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct DeviceStatus {
    pub id: Uuid,
    pub device_id: Uuid,
    pub status: String,
    pub detail: Option<String>,
    #[ts(type = "string")]
    pub recorded_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// AuthToken
///
/// The persisted record of an issued non-admin token. A user token is only honoured
/// while its row is live (not soft-deleted), independent of its signature.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AuthToken {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub action: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// --- Request Payloads ---

/// NameRequest
///
/// Body of the customer and site create/update routes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NameRequest {
    #[serde(default)]
    #[schema(example = "Acme Co")]
    pub name: String,
}

/// DeviceRequest
///
/// Body of the device create/update routes. Every field is optional on the wire and
/// defaults to an empty string.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
#[serde(default)]
pub struct DeviceRequest {
    pub gateway: String,
    pub controller: String,
    pub controller_serial_number: String,
    pub device_type: String,
    pub device_name: String,
    #[schema(example = "SN-0001")]
    pub device_serial_number: String,
    pub building_url: String,
    pub auth_token: String,
}

/// DeviceStatusRequest
///
/// Body of `POST /devices/{serial}/statuses`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DeviceStatusRequest {
    #[serde(default)]
    #[schema(example = "online")]
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// GenerateTokenRequest
///
/// Body of `POST /admin/generate-token`. Fields are optional so missing values are
/// reported with a field-specific message instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GenerateTokenRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    #[schema(example = "READ")]
    pub action: Option<String>,
    /// Adds a 30-day expiry to the issued token.
    #[serde(default)]
    pub expires: bool,
}

/// AuthenticateRequest
///
/// Body of `POST /authenticate`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub token: Option<String>,
}

// --- Response Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub name: String,
}

impl From<&Customer> for CustomerResponse {
    fn from(customer: &Customer) -> Self {
        Self { id: customer.id, name: customer.name.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct SiteResponse {
    pub id: Uuid,
    pub name: String,
    pub customer_id: Uuid,
    pub customer_name: String,
}

impl From<&Site> for SiteResponse {
    fn from(site: &Site) -> Self {
        Self {
            id: site.id,
            name: site.name.clone(),
            customer_id: site.customer_id,
            customer_name: site.customer_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub site_id: Uuid,
    pub site_name: String,
    pub gateway: String,
    pub controller: String,
    pub controller_serial_number: String,
    pub device_type: String,
    pub device_name: String,
    pub device_serial_number: String,
    pub building_url: String,
    pub auth_token: String,
}

impl From<&Device> for DeviceResponse {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            customer_id: device.customer_id,
            customer_name: device.customer_name.clone(),
            site_id: device.site_id,
            site_name: device.site_name.clone(),
            gateway: device.gateway.clone(),
            controller: device.controller.clone(),
            controller_serial_number: device.controller_serial_number.clone(),
            device_type: device.device_type.clone(),
            device_name: device.device_name.clone(),
            device_serial_number: device.device_serial_number.clone(),
            building_url: device.building_url.clone(),
            auth_token: device.auth_token.clone(),
        }
    }
}

/// AuthTokenResponse
///
/// The persisted token together with its customer, returned by `POST /admin/generate-token`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct AuthTokenResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer: CustomerResponse,
    pub action: String,
    pub token: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl AuthTokenResponse {
    pub fn new(token: &AuthToken, customer: &Customer) -> Self {
        Self {
            id: token.id,
            customer_id: token.customer_id,
            customer: CustomerResponse::from(customer),
            action: token.action.clone(),
            token: token.token.clone(),
            created_at: token.created_at,
            updated_at: token.updated_at,
        }
    }
}
