use uuid::Uuid;

use crate::{
    auth::Session,
    error::{ApiError, ApiResult},
    models::{Customer, Device, Site},
    repository::RepoError,
    token::Role,
};

/// ResourceKind
///
/// The three owned resources, with the vocabulary used in their response messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Customer,
    Site,
    Device,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Site => "Site",
            Self::Device => "Device",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Site => "site",
            Self::Device => "device",
        }
    }

    /// The field that is unique among rows of this kind.
    pub fn natural_key(self) -> &'static str {
        match self {
            Self::Customer | Self::Site => "name",
            Self::Device => "serial number",
        }
    }

    /// The path parameter routes use to address a row of this kind.
    pub fn lookup_key(self) -> &'static str {
        match self {
            Self::Customer | Self::Site => "ID",
            Self::Device => "serial number",
        }
    }
}

/// Resource
///
/// A persisted row that belongs to a customer and carries a soft-delete marker.
pub trait Resource {
    const KIND: ResourceKind;

    fn id(&self) -> Uuid;
    fn owner_id(&self) -> Uuid;
    fn is_deleted(&self) -> bool;
}

impl Resource for Customer {
    const KIND: ResourceKind = ResourceKind::Customer;

    fn id(&self) -> Uuid {
        self.id
    }
    // A customer owns itself.
    fn owner_id(&self) -> Uuid {
        self.id
    }
    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Resource for Site {
    const KIND: ResourceKind = ResourceKind::Site;

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner_id(&self) -> Uuid {
        self.customer_id
    }
    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Resource for Device {
    const KIND: ResourceKind = ResourceKind::Device;

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner_id(&self) -> Uuid {
        self.customer_id
    }
    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Outcome of a create request against a natural key.
#[derive(Debug)]
pub enum Upsert<T> {
    Created(T),
    Restored(T),
}

impl<T> Upsert<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upsert::Created(row) | Upsert::Restored(row) => row,
        }
    }
}

/// create_or_restore
///
/// Resolves a create request given the row (if any) already holding the natural key:
/// no row inserts, a soft-deleted row is restored in place, an active row is a conflict.
/// A unique violation raced in by a concurrent insert is also reported as a conflict.
pub async fn create_or_restore<T, C, CF, R, RF>(
    existing: Option<T>,
    create: C,
    restore: R,
) -> ApiResult<Upsert<T>>
where
    T: Resource,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T, RepoError>>,
    R: FnOnce(Uuid) -> RF,
    RF: Future<Output = Result<T, RepoError>>,
{
    let kind = T::KIND;
    let label = kind.label();
    match existing {
        None => match create().await {
            Ok(row) => Ok(Upsert::Created(row)),
            Err(RepoError::Conflict(_)) => Err(ApiError::already_exists(kind)),
            Err(e) => Err(ApiError::internal(format!("Failed to create {}", kind.noun()), e)),
        },
        Some(row) if row.is_deleted() => restore(row.id())
            .await
            .map(Upsert::Restored)
            .map_err(|e| ApiError::internal(format!("Failed to restore {label}"), e)),
        Some(_) => Err(ApiError::already_exists(kind)),
    }
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins pass; everyone else must be the owning customer.
    pub fn ensure_owner(&self, owner_id: Uuid) -> ApiResult<()> {
        if self.is_admin() || self.subject_id == owner_id {
            Ok(())
        } else {
            Err(ApiError::forbidden("Forbidden", "Unauthorized access"))
        }
    }

    pub fn ensure_can_read<T: Resource>(&self, row: &T) -> ApiResult<()> {
        self.ensure_owner(row.owner_id())
    }
}

/// Parses a path identifier, answering 400 for anything that is not a UUID.
pub fn parse_id(raw: &str, kind: ResourceKind) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::bad_request(format!("Invalid {} ID", kind.noun()), "Invalid UUID format")
    })
}
