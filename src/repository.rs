use crate::models::{AuthToken, Customer, Device, DeviceRequest, DeviceStatus, Site};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub mod memory;

pub use memory::InMemoryRepository;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// RepoError
///
/// Failures surfaced by the persistence layer. Unique-key collisions are reported as
/// `Conflict` so callers can answer with a 400 instead of a 500.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepoError::Conflict(db.message().to_string())
            }
            _ => RepoError::Database(err),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// The persistence contract used by every handler. Soft-deleted rows are invisible to
/// the default lookups. The natural-key lookups (`*_by_name`, `find_device_by_serial`)
/// include them, which is what create-or-restore relies on.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Customers ---
    async fn find_customer(&self, id: Uuid) -> RepoResult<Option<Customer>>;
    // Includes soft-deleted rows.
    async fn find_customer_by_name(&self, name: &str) -> RepoResult<Option<Customer>>;
    async fn list_customers(&self) -> RepoResult<Vec<Customer>>;
    async fn insert_customer(&self, name: &str) -> RepoResult<Customer>;
    // Clears the delete marker and refreshes both timestamps.
    async fn restore_customer(&self, id: Uuid) -> RepoResult<Customer>;
    async fn rename_customer(&self, id: Uuid, name: &str) -> RepoResult<Option<Customer>>;
    async fn soft_delete_customer(&self, id: Uuid) -> RepoResult<bool>;

    // --- Sites ---
    // Active site of an active customer.
    async fn find_site(&self, id: Uuid) -> RepoResult<Option<Site>>;
    // Includes soft-deleted rows.
    async fn find_site_by_name(&self, name: &str) -> RepoResult<Option<Site>>;
    async fn list_sites(&self) -> RepoResult<Vec<Site>>;
    async fn list_sites_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Site>>;
    async fn insert_site(&self, customer_id: Uuid, name: &str) -> RepoResult<Site>;
    async fn restore_site(&self, id: Uuid) -> RepoResult<Site>;
    async fn rename_site(&self, id: Uuid, name: &str) -> RepoResult<Option<Site>>;
    async fn soft_delete_site(&self, id: Uuid) -> RepoResult<bool>;

    // --- Devices ---
    // Includes soft-deleted rows.
    async fn find_device_by_serial(&self, serial: &str) -> RepoResult<Option<Device>>;
    async fn list_devices(&self) -> RepoResult<Vec<Device>>;
    async fn list_devices_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Device>>;
    async fn list_devices_for_site(&self, site_id: Uuid) -> RepoResult<Vec<Device>>;
    async fn insert_device(&self, site_id: Uuid, fields: &DeviceRequest) -> RepoResult<Device>;
    async fn restore_device(&self, id: Uuid) -> RepoResult<Device>;
    // Overwrites every mutable field; the site reference never changes.
    async fn update_device(&self, id: Uuid, fields: &DeviceRequest) -> RepoResult<Option<Device>>;
    async fn soft_delete_device(&self, id: Uuid) -> RepoResult<bool>;

    // --- Device Statuses ---
    async fn list_device_statuses(&self, device_id: Uuid) -> RepoResult<Vec<DeviceStatus>>;
    async fn record_device_status(
        &self,
        device_id: Uuid,
        status: &str,
        detail: Option<&str>,
    ) -> RepoResult<DeviceStatus>;

    // --- Auth Tokens ---
    async fn insert_auth_token(
        &self,
        customer_id: Uuid,
        action: &str,
        token: &str,
    ) -> RepoResult<AuthToken>;
    // Live (not revoked) token row holding exactly this token string.
    async fn find_token_by_value(&self, token: &str) -> RepoResult<Option<AuthToken>>;
    async fn revoke_auth_token(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CUSTOMER_COLUMNS: &str = "id, name, created_at, updated_at, deleted_at";

const SITE_SELECT: &str = r#"
    SELECT s.id, s.customer_id, c.name AS customer_name, s.name,
           s.created_at, s.updated_at, s.deleted_at
    FROM sites s
    JOIN customers c ON c.id = s.customer_id
"#;

const DEVICE_SELECT: &str = r#"
    SELECT d.id, d.site_id, s.name AS site_name, s.customer_id, c.name AS customer_name,
           d.gateway, d.controller, d.controller_serial_number, d.device_type,
           d.device_name, d.device_serial_number, d.building_url, d.auth_token,
           d.created_at, d.updated_at, d.deleted_at
    FROM devices d
    JOIN sites s ON s.id = d.site_id
    JOIN customers c ON c.id = s.customer_id
"#;

const STATUS_COLUMNS: &str =
    "id, device_id, status, detail, recorded_at, created_at, updated_at, deleted_at";

const TOKEN_COLUMNS: &str = "id, customer_id, action, token, created_at, updated_at, deleted_at";

impl PostgresRepository {
    /// Re-reads a site through the customer join after a write.
    async fn site_by_id_any(&self, id: Uuid) -> RepoResult<Site> {
        let query = format!("{SITE_SELECT} WHERE s.id = $1");
        Ok(sqlx::query_as::<_, Site>(&query).bind(id).fetch_one(&self.pool).await?)
    }

    /// Re-reads a device through the site/customer joins after a write.
    async fn device_by_id_any(&self, id: Uuid) -> RepoResult<Device> {
        let query = format!("{DEVICE_SELECT} WHERE d.id = $1");
        Ok(sqlx::query_as::<_, Device>(&query).bind(id).fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_customer(&self, id: Uuid) -> RepoResult<Option<Customer>> {
        let query =
            format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, Customer>(&query).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_customer_by_name(&self, name: &str) -> RepoResult<Option<Customer>> {
        let query = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE name = $1");
        Ok(sqlx::query_as::<_, Customer>(&query).bind(name).fetch_optional(&self.pool).await?)
    }

    async fn list_customers(&self) -> RepoResult<Vec<Customer>> {
        let query = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE deleted_at IS NULL ORDER BY name ASC"
        );
        Ok(sqlx::query_as::<_, Customer>(&query).fetch_all(&self.pool).await?)
    }

    async fn insert_customer(&self, name: &str) -> RepoResult<Customer> {
        let query = format!(
            "INSERT INTO customers (id, name, created_at, updated_at) VALUES ($1, $2, NOW(), NOW()) \
             RETURNING {CUSTOMER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Customer>(&query)
            .bind(Uuid::new_v4())
            .bind(name)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn restore_customer(&self, id: Uuid) -> RepoResult<Customer> {
        let query = format!(
            "UPDATE customers SET deleted_at = NULL, created_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {CUSTOMER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Customer>(&query).bind(id).fetch_one(&self.pool).await?)
    }

    async fn rename_customer(&self, id: Uuid, name: &str) -> RepoResult<Option<Customer>> {
        let query = format!(
            "UPDATE customers SET name = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {CUSTOMER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Customer>(&query)
            .bind(id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete_customer(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE customers SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_site(&self, id: Uuid) -> RepoResult<Option<Site>> {
        let query = format!(
            "{SITE_SELECT} WHERE s.id = $1 AND s.deleted_at IS NULL AND c.deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, Site>(&query).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_site_by_name(&self, name: &str) -> RepoResult<Option<Site>> {
        let query = format!("{SITE_SELECT} WHERE s.name = $1");
        Ok(sqlx::query_as::<_, Site>(&query).bind(name).fetch_optional(&self.pool).await?)
    }

    async fn list_sites(&self) -> RepoResult<Vec<Site>> {
        let query = format!(
            "{SITE_SELECT} WHERE s.deleted_at IS NULL AND c.deleted_at IS NULL ORDER BY s.name ASC"
        );
        Ok(sqlx::query_as::<_, Site>(&query).fetch_all(&self.pool).await?)
    }

    async fn list_sites_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Site>> {
        let query = format!(
            "{SITE_SELECT} WHERE s.customer_id = $1 AND s.deleted_at IS NULL ORDER BY s.name ASC"
        );
        Ok(sqlx::query_as::<_, Site>(&query).bind(customer_id).fetch_all(&self.pool).await?)
    }

    async fn insert_site(&self, customer_id: Uuid, name: &str) -> RepoResult<Site> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO sites (id, customer_id, name, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        self.site_by_id_any(id).await
    }

    async fn restore_site(&self, id: Uuid) -> RepoResult<Site> {
        sqlx::query(
            "UPDATE sites SET deleted_at = NULL, created_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.site_by_id_any(id).await
    }

    async fn rename_site(&self, id: Uuid, name: &str) -> RepoResult<Option<Site>> {
        let result = sqlx::query(
            "UPDATE sites SET name = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.site_by_id_any(id).await.map(Some)
    }

    async fn soft_delete_site(&self, id: Uuid) -> RepoResult<bool> {
        let result =
            sqlx::query("UPDATE sites SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_device_by_serial(&self, serial: &str) -> RepoResult<Option<Device>> {
        let query = format!("{DEVICE_SELECT} WHERE d.device_serial_number = $1");
        Ok(sqlx::query_as::<_, Device>(&query).bind(serial).fetch_optional(&self.pool).await?)
    }

    async fn list_devices(&self) -> RepoResult<Vec<Device>> {
        let query = format!(
            "{DEVICE_SELECT} WHERE d.deleted_at IS NULL AND s.deleted_at IS NULL \
             AND c.deleted_at IS NULL ORDER BY d.device_serial_number ASC"
        );
        Ok(sqlx::query_as::<_, Device>(&query).fetch_all(&self.pool).await?)
    }

    async fn list_devices_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Device>> {
        let query = format!(
            "{DEVICE_SELECT} WHERE s.customer_id = $1 AND d.deleted_at IS NULL \
             AND s.deleted_at IS NULL AND c.deleted_at IS NULL \
             ORDER BY d.device_serial_number ASC"
        );
        Ok(sqlx::query_as::<_, Device>(&query).bind(customer_id).fetch_all(&self.pool).await?)
    }

    async fn list_devices_for_site(&self, site_id: Uuid) -> RepoResult<Vec<Device>> {
        let query = format!(
            "{DEVICE_SELECT} WHERE d.site_id = $1 AND d.deleted_at IS NULL \
             ORDER BY d.device_serial_number ASC"
        );
        Ok(sqlx::query_as::<_, Device>(&query).bind(site_id).fetch_all(&self.pool).await?)
    }

    async fn insert_device(&self, site_id: Uuid, fields: &DeviceRequest) -> RepoResult<Device> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO devices (
                id, site_id, gateway, controller, controller_serial_number, device_type,
                device_name, device_serial_number, building_url, auth_token, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(site_id)
        .bind(&fields.gateway)
        .bind(&fields.controller)
        .bind(&fields.controller_serial_number)
        .bind(&fields.device_type)
        .bind(&fields.device_name)
        .bind(&fields.device_serial_number)
        .bind(&fields.building_url)
        .bind(&fields.auth_token)
        .fetch_one(&self.pool)
        .await?;
        self.device_by_id_any(id).await
    }

    async fn restore_device(&self, id: Uuid) -> RepoResult<Device> {
        sqlx::query(
            "UPDATE devices SET deleted_at = NULL, created_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.device_by_id_any(id).await
    }

    async fn update_device(&self, id: Uuid, fields: &DeviceRequest) -> RepoResult<Option<Device>> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET gateway = $2,
                controller = $3,
                controller_serial_number = $4,
                device_type = $5,
                device_name = $6,
                device_serial_number = $7,
                building_url = $8,
                auth_token = $9,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(&fields.gateway)
        .bind(&fields.controller)
        .bind(&fields.controller_serial_number)
        .bind(&fields.device_type)
        .bind(&fields.device_name)
        .bind(&fields.device_serial_number)
        .bind(&fields.building_url)
        .bind(&fields.auth_token)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.device_by_id_any(id).await.map(Some)
    }

    async fn soft_delete_device(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_device_statuses(&self, device_id: Uuid) -> RepoResult<Vec<DeviceStatus>> {
        let query = format!(
            "SELECT {STATUS_COLUMNS} FROM device_statuses \
             WHERE device_id = $1 AND deleted_at IS NULL ORDER BY recorded_at DESC"
        );
        Ok(sqlx::query_as::<_, DeviceStatus>(&query)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn record_device_status(
        &self,
        device_id: Uuid,
        status: &str,
        detail: Option<&str>,
    ) -> RepoResult<DeviceStatus> {
        let query = format!(
            "INSERT INTO device_statuses (id, device_id, status, detail, recorded_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW(), NOW()) RETURNING {STATUS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DeviceStatus>(&query)
            .bind(Uuid::new_v4())
            .bind(device_id)
            .bind(status)
            .bind(detail)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn insert_auth_token(
        &self,
        customer_id: Uuid,
        action: &str,
        token: &str,
    ) -> RepoResult<AuthToken> {
        let query = format!(
            "INSERT INTO auth_tokens (id, customer_id, action, token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {TOKEN_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AuthToken>(&query)
            .bind(Uuid::new_v4())
            .bind(customer_id)
            .bind(action)
            .bind(token)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_token_by_value(&self, token: &str) -> RepoResult<Option<AuthToken>> {
        let query = format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_tokens WHERE token = $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, AuthToken>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn revoke_auth_token(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
