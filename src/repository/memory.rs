use super::{RepoError, RepoResult, Repository};
use crate::models::{AuthToken, Customer, Device, DeviceRequest, DeviceStatus, Site};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Raw device columns; the joined `Device` view is assembled on read.
#[derive(Debug, Clone)]
struct DeviceRow {
    id: Uuid,
    site_id: Uuid,
    fields: DeviceRequest,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    deleted_at: Option<chrono::DateTime<Utc>>,
}

/// Raw site columns; `customer_name` is joined on read.
#[derive(Debug, Clone)]
struct SiteRow {
    id: Uuid,
    customer_id: Uuid,
    name: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    deleted_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    customers: Vec<Customer>,
    sites: Vec<SiteRow>,
    devices: Vec<DeviceRow>,
    statuses: Vec<DeviceStatus>,
    tokens: Vec<AuthToken>,
}

impl Tables {
    fn customer_any(&self, id: Uuid) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    fn site_view(&self, row: &SiteRow) -> Option<Site> {
        let customer = self.customer_any(row.customer_id)?;
        Some(Site {
            id: row.id,
            customer_id: row.customer_id,
            customer_name: customer.name.clone(),
            name: row.name.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }

    fn device_view(&self, row: &DeviceRow) -> Option<Device> {
        let site = self.sites.iter().find(|s| s.id == row.site_id)?;
        let customer = self.customer_any(site.customer_id)?;
        let f = &row.fields;
        Some(Device {
            id: row.id,
            site_id: site.id,
            site_name: site.name.clone(),
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            gateway: f.gateway.clone(),
            controller: f.controller.clone(),
            controller_serial_number: f.controller_serial_number.clone(),
            device_type: f.device_type.clone(),
            device_name: f.device_name.clone(),
            device_serial_number: f.device_serial_number.clone(),
            building_url: f.building_url.clone(),
            auth_token: f.auth_token.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }

    /// The site and its customer are both live.
    fn site_is_active(&self, site_id: Uuid) -> bool {
        self.sites.iter().any(|s| {
            s.id == site_id
                && s.deleted_at.is_none()
                && self.customer_any(s.customer_id).is_some_and(|c| c.deleted_at.is_none())
        })
    }

    fn active_devices(&self, keep: impl Fn(&DeviceRow) -> bool) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.deleted_at.is_none() && self.site_is_active(d.site_id) && keep(d))
            .filter_map(|d| self.device_view(d))
            .collect();
        devices.sort_by(|a, b| a.device_serial_number.cmp(&b.device_serial_number));
        devices
    }

    fn active_sites(&self, keep: impl Fn(&SiteRow) -> bool) -> Vec<Site> {
        let mut sites: Vec<Site> = self
            .sites
            .iter()
            .filter(|s| s.deleted_at.is_none() && keep(s))
            .filter_map(|s| self.site_view(s))
            .collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        sites
    }

    fn serial_taken(&self, serial: &str, except: Option<Uuid>) -> bool {
        self.devices
            .iter()
            .any(|d| d.fields.device_serial_number == serial && Some(d.id) != except)
    }
}

/// InMemoryRepository
///
/// A process-local `Repository` with the same visibility and uniqueness rules as the
/// Postgres implementation. Used by the router tests so they run without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found() -> RepoError {
    RepoError::Database(sqlx::Error::RowNotFound)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_customer(&self, id: Uuid) -> RepoResult<Option<Customer>> {
        let tables = self.lock();
        Ok(tables.customers.iter().find(|c| c.id == id && c.deleted_at.is_none()).cloned())
    }

    async fn find_customer_by_name(&self, name: &str) -> RepoResult<Option<Customer>> {
        Ok(self.lock().customers.iter().find(|c| c.name == name).cloned())
    }

    async fn list_customers(&self) -> RepoResult<Vec<Customer>> {
        let mut customers: Vec<Customer> =
            self.lock().customers.iter().filter(|c| c.deleted_at.is_none()).cloned().collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customers)
    }

    async fn insert_customer(&self, name: &str) -> RepoResult<Customer> {
        let mut tables = self.lock();
        if tables.customers.iter().any(|c| c.name == name) {
            return Err(RepoError::Conflict(format!("customers.name = {name}")));
        }
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.customers.push(customer.clone());
        Ok(customer)
    }

    async fn restore_customer(&self, id: Uuid) -> RepoResult<Customer> {
        let mut tables = self.lock();
        let customer = tables.customers.iter_mut().find(|c| c.id == id).ok_or_else(not_found)?;
        let now = Utc::now();
        customer.deleted_at = None;
        customer.created_at = now;
        customer.updated_at = now;
        Ok(customer.clone())
    }

    async fn rename_customer(&self, id: Uuid, name: &str) -> RepoResult<Option<Customer>> {
        let mut tables = self.lock();
        if tables.customers.iter().any(|c| c.name == name && c.id != id) {
            return Err(RepoError::Conflict(format!("customers.name = {name}")));
        }
        let Some(customer) =
            tables.customers.iter_mut().find(|c| c.id == id && c.deleted_at.is_none())
        else {
            return Ok(None);
        };
        customer.name = name.to_string();
        customer.updated_at = Utc::now();
        Ok(Some(customer.clone()))
    }

    async fn soft_delete_customer(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.lock();
        match tables.customers.iter_mut().find(|c| c.id == id && c.deleted_at.is_none()) {
            Some(customer) => {
                customer.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_site(&self, id: Uuid) -> RepoResult<Option<Site>> {
        let tables = self.lock();
        let site = tables
            .sites
            .iter()
            .find(|s| s.id == id && s.deleted_at.is_none())
            .filter(|s| {
                tables.customer_any(s.customer_id).is_some_and(|c| c.deleted_at.is_none())
            })
            .and_then(|s| tables.site_view(s));
        Ok(site)
    }

    async fn find_site_by_name(&self, name: &str) -> RepoResult<Option<Site>> {
        let tables = self.lock();
        Ok(tables.sites.iter().find(|s| s.name == name).and_then(|s| tables.site_view(s)))
    }

    async fn list_sites(&self) -> RepoResult<Vec<Site>> {
        let tables = self.lock();
        Ok(tables.active_sites(|s| {
            tables.customer_any(s.customer_id).is_some_and(|c| c.deleted_at.is_none())
        }))
    }

    async fn list_sites_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Site>> {
        Ok(self.lock().active_sites(|s| s.customer_id == customer_id))
    }

    async fn insert_site(&self, customer_id: Uuid, name: &str) -> RepoResult<Site> {
        let mut tables = self.lock();
        if tables.sites.iter().any(|s| s.name == name) {
            return Err(RepoError::Conflict(format!("sites.name = {name}")));
        }
        if tables.customer_any(customer_id).is_none() {
            return Err(not_found());
        }
        let now = Utc::now();
        let row = SiteRow {
            id: Uuid::new_v4(),
            customer_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.sites.push(row.clone());
        tables.site_view(&row).ok_or_else(not_found)
    }

    async fn restore_site(&self, id: Uuid) -> RepoResult<Site> {
        let mut tables = self.lock();
        let row = tables.sites.iter_mut().find(|s| s.id == id).ok_or_else(not_found)?;
        let now = Utc::now();
        row.deleted_at = None;
        row.created_at = now;
        row.updated_at = now;
        let row = row.clone();
        tables.site_view(&row).ok_or_else(not_found)
    }

    async fn rename_site(&self, id: Uuid, name: &str) -> RepoResult<Option<Site>> {
        let mut tables = self.lock();
        if tables.sites.iter().any(|s| s.name == name && s.id != id) {
            return Err(RepoError::Conflict(format!("sites.name = {name}")));
        }
        let Some(row) = tables.sites.iter_mut().find(|s| s.id == id && s.deleted_at.is_none())
        else {
            return Ok(None);
        };
        row.name = name.to_string();
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(tables.site_view(&row))
    }

    async fn soft_delete_site(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.lock();
        match tables.sites.iter_mut().find(|s| s.id == id && s.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_device_by_serial(&self, serial: &str) -> RepoResult<Option<Device>> {
        let tables = self.lock();
        Ok(tables
            .devices
            .iter()
            .find(|d| d.fields.device_serial_number == serial)
            .and_then(|d| tables.device_view(d)))
    }

    async fn list_devices(&self) -> RepoResult<Vec<Device>> {
        Ok(self.lock().active_devices(|_| true))
    }

    async fn list_devices_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Device>> {
        let tables = self.lock();
        Ok(tables.active_devices(|d| {
            tables.sites.iter().any(|s| s.id == d.site_id && s.customer_id == customer_id)
        }))
    }

    async fn list_devices_for_site(&self, site_id: Uuid) -> RepoResult<Vec<Device>> {
        let tables = self.lock();
        let mut devices: Vec<Device> = tables
            .devices
            .iter()
            .filter(|d| d.site_id == site_id && d.deleted_at.is_none())
            .filter_map(|d| tables.device_view(d))
            .collect();
        devices.sort_by(|a, b| a.device_serial_number.cmp(&b.device_serial_number));
        Ok(devices)
    }

    async fn insert_device(&self, site_id: Uuid, fields: &DeviceRequest) -> RepoResult<Device> {
        let mut tables = self.lock();
        if tables.serial_taken(&fields.device_serial_number, None) {
            return Err(RepoError::Conflict(format!(
                "devices.device_serial_number = {}",
                fields.device_serial_number
            )));
        }
        let now = Utc::now();
        let row = DeviceRow {
            id: Uuid::new_v4(),
            site_id,
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.devices.push(row.clone());
        tables.device_view(&row).ok_or_else(not_found)
    }

    async fn restore_device(&self, id: Uuid) -> RepoResult<Device> {
        let mut tables = self.lock();
        let row = tables.devices.iter_mut().find(|d| d.id == id).ok_or_else(not_found)?;
        let now = Utc::now();
        row.deleted_at = None;
        row.created_at = now;
        row.updated_at = now;
        let row = row.clone();
        tables.device_view(&row).ok_or_else(not_found)
    }

    async fn update_device(&self, id: Uuid, fields: &DeviceRequest) -> RepoResult<Option<Device>> {
        let mut tables = self.lock();
        if tables.serial_taken(&fields.device_serial_number, Some(id)) {
            return Err(RepoError::Conflict(format!(
                "devices.device_serial_number = {}",
                fields.device_serial_number
            )));
        }
        let Some(row) = tables.devices.iter_mut().find(|d| d.id == id && d.deleted_at.is_none())
        else {
            return Ok(None);
        };
        row.fields = fields.clone();
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(tables.device_view(&row))
    }

    async fn soft_delete_device(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.lock();
        match tables.devices.iter_mut().find(|d| d.id == id && d.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_device_statuses(&self, device_id: Uuid) -> RepoResult<Vec<DeviceStatus>> {
        let mut statuses: Vec<DeviceStatus> = self
            .lock()
            .statuses
            .iter()
            .filter(|s| s.device_id == device_id && s.deleted_at.is_none())
            .cloned()
            .collect();
        statuses.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(statuses)
    }

    async fn record_device_status(
        &self,
        device_id: Uuid,
        status: &str,
        detail: Option<&str>,
    ) -> RepoResult<DeviceStatus> {
        let now = Utc::now();
        let record = DeviceStatus {
            id: Uuid::new_v4(),
            device_id,
            status: status.to_string(),
            detail: detail.map(str::to_string),
            recorded_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock().statuses.push(record.clone());
        Ok(record)
    }

    async fn insert_auth_token(
        &self,
        customer_id: Uuid,
        action: &str,
        token: &str,
    ) -> RepoResult<AuthToken> {
        let mut tables = self.lock();
        if tables.tokens.iter().any(|t| t.token == token) {
            return Err(RepoError::Conflict("auth_tokens.token".to_string()));
        }
        let now = Utc::now();
        let record = AuthToken {
            id: Uuid::new_v4(),
            customer_id,
            action: action.to_string(),
            token: token.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.tokens.push(record.clone());
        Ok(record)
    }

    async fn find_token_by_value(&self, token: &str) -> RepoResult<Option<AuthToken>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|t| t.token == token && t.deleted_at.is_none())
            .cloned())
    }

    async fn revoke_auth_token(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.lock();
        match tables.tokens.iter_mut().find(|t| t.id == id && t.deleted_at.is_none()) {
            Some(token) => {
                let now = Utc::now();
                token.deleted_at = Some(now);
                token.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_customer_name_is_a_conflict() {
        let repo = InMemoryRepository::new();
        repo.insert_customer("Acme").await.unwrap();
        let err = repo.insert_customer("Acme").await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn soft_deleted_customer_stays_visible_by_name() {
        let repo = InMemoryRepository::new();
        let customer = repo.insert_customer("Acme").await.unwrap();
        assert!(repo.soft_delete_customer(customer.id).await.unwrap());

        assert!(repo.find_customer(customer.id).await.unwrap().is_none());
        let by_name = repo.find_customer_by_name("Acme").await.unwrap().unwrap();
        assert!(by_name.deleted_at.is_some());

        let restored = repo.restore_customer(customer.id).await.unwrap();
        assert_eq!(restored.id, customer.id);
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn site_of_deleted_customer_is_hidden() {
        let repo = InMemoryRepository::new();
        let customer = repo.insert_customer("Acme").await.unwrap();
        let site = repo.insert_site(customer.id, "HQ").await.unwrap();
        assert_eq!(site.customer_name, "Acme");

        repo.soft_delete_customer(customer.id).await.unwrap();
        assert!(repo.find_site(site.id).await.unwrap().is_none());
        assert!(repo.list_sites().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn devices_of_deleted_customer_are_hidden() {
        let repo = InMemoryRepository::new();
        let customer = repo.insert_customer("Acme").await.unwrap();
        let site = repo.insert_site(customer.id, "HQ").await.unwrap();
        let fields = DeviceRequest { device_serial_number: "SN-1".into(), ..Default::default() };
        repo.insert_device(site.id, &fields).await.unwrap();
        assert_eq!(repo.list_devices().await.unwrap().len(), 1);

        repo.soft_delete_customer(customer.id).await.unwrap();
        assert!(repo.list_devices().await.unwrap().is_empty());
        assert!(repo.list_devices_for_customer(customer.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn device_serial_is_unique_across_updates() {
        let repo = InMemoryRepository::new();
        let customer = repo.insert_customer("Acme").await.unwrap();
        let site = repo.insert_site(customer.id, "HQ").await.unwrap();
        let first = DeviceRequest { device_serial_number: "SN-1".into(), ..Default::default() };
        let second = DeviceRequest { device_serial_number: "SN-2".into(), ..Default::default() };
        repo.insert_device(site.id, &first).await.unwrap();
        let device = repo.insert_device(site.id, &second).await.unwrap();

        let err = repo.update_device(device.id, &first).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn revoked_token_is_not_found() {
        let repo = InMemoryRepository::new();
        let customer = repo.insert_customer("Acme").await.unwrap();
        let token = repo.insert_auth_token(customer.id, "READ", "abc").await.unwrap();
        assert!(repo.find_token_by_value("abc").await.unwrap().is_some());

        assert!(repo.revoke_auth_token(token.id).await.unwrap());
        assert!(repo.find_token_by_value("abc").await.unwrap().is_none());
        assert!(!repo.revoke_auth_token(token.id).await.unwrap());
    }
}
