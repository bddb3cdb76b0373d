use axum::extract::{Path, State};

use super::{load_customer, require_field};
use crate::{
    access::{ResourceKind, Upsert, create_or_restore, parse_id},
    auth::Session,
    error::{ApiError, ApiResult, RepoResultExt},
    models::{CustomerResponse, NameRequest},
    repository::{RepoError, RepositoryState},
    response::{ApiResponse, JsonBody},
};

/// create_customer
///
/// [Admin Route] Creates a customer, or restores a soft-deleted one holding the same name
/// (same id, fresh timestamps).
#[utoipa::path(
    post,
    path = "/customers",
    tag = "customers",
    request_body = NameRequest,
    responses(
        (status = 201, description = "Customer created", body = CustomerResponse),
        (status = 200, description = "Customer restored", body = CustomerResponse),
        (status = 400, description = "Customer already exists")
    )
)]
pub async fn create_customer(
    State(repo): State<RepositoryState>,
    JsonBody(body): JsonBody<NameRequest>,
) -> ApiResult<ApiResponse<CustomerResponse>> {
    let name = require_field(&body.name, "Name")?;

    let existing = repo
        .find_customer_by_name(&name)
        .await
        .or_internal("Failed to fetch customer")?;

    let outcome = create_or_restore(
        existing,
        || repo.insert_customer(&name),
        |id| repo.restore_customer(id),
    )
    .await?;

    Ok(match outcome {
        Upsert::Created(c) => {
            tracing::info!(customer_id = %c.id, "customer created");
            ApiResponse::created("Customer created", CustomerResponse::from(&c))
        }
        Upsert::Restored(c) => {
            tracing::info!(customer_id = %c.id, "customer restored");
            ApiResponse::ok("Customer restored", CustomerResponse::from(&c))
        }
    })
}

/// list_customers
///
/// [Admin Route] Lists every active customer.
#[utoipa::path(
    get,
    path = "/customers",
    tag = "customers",
    responses((status = 200, description = "Customers fetched", body = [CustomerResponse]))
)]
pub async fn list_customers(
    State(repo): State<RepositoryState>,
) -> ApiResult<ApiResponse<Vec<CustomerResponse>>> {
    let customers = repo.list_customers().await.or_internal("Failed to fetch customers")?;
    Ok(ApiResponse::ok(
        "Customers fetched",
        customers.iter().map(CustomerResponse::from).collect(),
    ))
}

/// get_customer
///
/// [Session Route] Fetches one customer. A user token may only read its own customer;
/// the ownership check runs before the lookup so existence is never disclosed.
#[utoipa::path(
    get,
    path = "/customers/{customer_id}",
    tag = "customers",
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 200, description = "Customer fetched", body = CustomerResponse),
        (status = 403, description = "Not the caller's customer"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn get_customer(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
) -> ApiResult<ApiResponse<CustomerResponse>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    session.ensure_owner(customer_id)?;

    let customer = load_customer(&repo, customer_id).await?;
    Ok(ApiResponse::ok("Customer fetched", CustomerResponse::from(&customer)))
}

/// update_customer
///
/// [Admin Route] Renames a customer.
#[utoipa::path(
    put,
    path = "/customers/{customer_id}",
    tag = "customers",
    request_body = NameRequest,
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 200, description = "Customer updated", body = CustomerResponse),
        (status = 400, description = "Name taken or missing"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn update_customer(
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
    JsonBody(body): JsonBody<NameRequest>,
) -> ApiResult<ApiResponse<CustomerResponse>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    let name = require_field(&body.name, "Name")?;

    let customer = match repo.rename_customer(customer_id, &name).await {
        Ok(Some(customer)) => customer,
        Ok(None) => return Err(ApiError::missing(ResourceKind::Customer)),
        Err(RepoError::Conflict(_)) => return Err(ApiError::already_exists(ResourceKind::Customer)),
        Err(e) => return Err(ApiError::internal("Failed to update customer", e)),
    };

    Ok(ApiResponse::ok("Customer updated", CustomerResponse::from(&customer)))
}

/// delete_customer
///
/// [Admin Route] Soft-deletes a customer. The row keeps its name reserved until restored.
#[utoipa::path(
    delete,
    path = "/customers/{customer_id}",
    tag = "customers",
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 200, description = "Customer deleted"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn delete_customer(
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;

    if !repo.soft_delete_customer(customer_id).await.or_internal("Failed to delete customer")? {
        return Err(ApiError::missing(ResourceKind::Customer));
    }

    tracing::info!(%customer_id, "customer deleted");
    Ok(ApiResponse::message("Customer deleted"))
}
