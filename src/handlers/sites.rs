use axum::extract::{Path, State};

use super::{load_customer, load_site, require_field};
use crate::{
    access::{ResourceKind, Upsert, create_or_restore, parse_id},
    auth::Session,
    error::{ApiError, ApiResult, RepoResultExt},
    models::{NameRequest, Site, SiteResponse},
    repository::{RepoError, RepositoryState},
    response::{ApiResponse, JsonBody},
};

fn site_list(sites: &[Site]) -> Vec<SiteResponse> {
    sites.iter().map(SiteResponse::from).collect()
}

/// create_site
///
/// [Admin Route] Creates a site under an existing customer, or restores a soft-deleted
/// site with the same name. A deleted site belonging to another customer is not moved.
#[utoipa::path(
    post,
    path = "/customers/{customer_id}/sites",
    tag = "sites",
    request_body = NameRequest,
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 201, description = "Site created", body = SiteResponse),
        (status = 200, description = "Site restored", body = SiteResponse),
        (status = 400, description = "Site already exists"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn create_site(
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
    JsonBody(body): JsonBody<NameRequest>,
) -> ApiResult<ApiResponse<SiteResponse>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    let name = require_field(&body.name, "Name")?;
    let customer = load_customer(&repo, customer_id).await?;

    let existing = repo.find_site_by_name(&name).await.or_internal("Failed to fetch site")?;
    if existing.as_ref().is_some_and(|site| site.customer_id != customer.id) {
        return Err(ApiError::already_exists(ResourceKind::Site));
    }

    let outcome = create_or_restore(
        existing,
        || repo.insert_site(customer.id, &name),
        |id| repo.restore_site(id),
    )
    .await?;

    Ok(match outcome {
        Upsert::Created(site) => {
            tracing::info!(site_id = %site.id, customer_id = %customer.id, "site created");
            ApiResponse::created("Site created", SiteResponse::from(&site))
        }
        Upsert::Restored(site) => {
            tracing::info!(site_id = %site.id, customer_id = %customer.id, "site restored");
            ApiResponse::ok("Site restored", SiteResponse::from(&site))
        }
    })
}

/// list_sites
///
/// [Admin Route] Lists every active site.
#[utoipa::path(
    get,
    path = "/sites",
    tag = "sites",
    responses((status = 200, description = "Sites fetched", body = [SiteResponse]))
)]
pub async fn list_sites(
    State(repo): State<RepositoryState>,
) -> ApiResult<ApiResponse<Vec<SiteResponse>>> {
    let sites = repo.list_sites().await.or_internal("Failed to fetch sites")?;
    Ok(ApiResponse::ok("Sites fetched", site_list(&sites)))
}

/// list_customer_sites
///
/// [Session Route] Lists the active sites of one customer. Owner or admin.
#[utoipa::path(
    get,
    path = "/customers/{customer_id}/sites",
    tag = "sites",
    params(("customer_id" = String, Path, description = "Customer UUID")),
    responses(
        (status = 200, description = "Sites fetched", body = [SiteResponse]),
        (status = 403, description = "Not the caller's customer"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn list_customer_sites(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(customer_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<SiteResponse>>> {
    let customer_id = parse_id(&customer_id, ResourceKind::Customer)?;
    session.ensure_owner(customer_id)?;
    let customer = load_customer(&repo, customer_id).await?;

    let sites = repo
        .list_sites_for_customer(customer.id)
        .await
        .or_internal("Failed to fetch sites")?;
    Ok(ApiResponse::ok("Sites fetched", site_list(&sites)))
}

/// get_site
///
/// [Session Route] Fetches one site. Owner or admin.
#[utoipa::path(
    get,
    path = "/sites/{site_id}",
    tag = "sites",
    params(("site_id" = String, Path, description = "Site UUID")),
    responses(
        (status = 200, description = "Site fetched", body = SiteResponse),
        (status = 403, description = "Site belongs to another customer"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn get_site(
    session: Session,
    State(repo): State<RepositoryState>,
    Path(site_id): Path<String>,
) -> ApiResult<ApiResponse<SiteResponse>> {
    let site_id = parse_id(&site_id, ResourceKind::Site)?;
    let site = load_site(&repo, site_id).await?;
    session.ensure_can_read(&site)?;
    Ok(ApiResponse::ok("Site fetched", SiteResponse::from(&site)))
}

/// update_site
///
/// [Admin Route] Renames a site. The owning customer never changes.
#[utoipa::path(
    put,
    path = "/sites/{site_id}",
    tag = "sites",
    request_body = NameRequest,
    params(("site_id" = String, Path, description = "Site UUID")),
    responses(
        (status = 200, description = "Site updated", body = SiteResponse),
        (status = 400, description = "Name taken or missing"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn update_site(
    State(repo): State<RepositoryState>,
    Path(site_id): Path<String>,
    JsonBody(body): JsonBody<NameRequest>,
) -> ApiResult<ApiResponse<SiteResponse>> {
    let site_id = parse_id(&site_id, ResourceKind::Site)?;
    let name = require_field(&body.name, "Name")?;

    let site = match repo.rename_site(site_id, &name).await {
        Ok(Some(site)) => site,
        Ok(None) => return Err(ApiError::missing(ResourceKind::Site)),
        Err(RepoError::Conflict(_)) => return Err(ApiError::already_exists(ResourceKind::Site)),
        Err(e) => return Err(ApiError::internal("Failed to update site", e)),
    };

    Ok(ApiResponse::ok("Site updated", SiteResponse::from(&site)))
}

/// delete_site
///
/// [Admin Route] Soft-deletes a site.
#[utoipa::path(
    delete,
    path = "/sites/{site_id}",
    tag = "sites",
    params(("site_id" = String, Path, description = "Site UUID")),
    responses(
        (status = 200, description = "Site deleted"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn delete_site(
    State(repo): State<RepositoryState>,
    Path(site_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let site_id = parse_id(&site_id, ResourceKind::Site)?;

    if !repo.soft_delete_site(site_id).await.or_internal("Failed to delete site")? {
        return Err(ApiError::missing(ResourceKind::Site));
    }

    tracing::info!(%site_id, "site deleted");
    Ok(ApiResponse::message("Site deleted"))
}
