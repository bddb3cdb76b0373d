use crate::{
    AppState,
    auth::admin_only,
    handlers::{customers, devices, sites},
};
use axum::{
    Router,
    middleware,
    routing::{MethodRouter, get, post, put},
};

/// Wraps a method router so only admin sessions reach its handlers.
fn admin(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn(admin_only))
}

/// Authenticated Router Module
///
/// Customer, site and device routes. The whole router sits behind `require_session`;
/// routes wrapped in `admin(..)` are further restricted to admin tokens. Read routes
/// left open to user tokens enforce ownership inside the handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // --- Customers ---
        // POST /customers, GET /customers
        // Create-or-restore by name, and the global listing. Admin only.
        .route(
            "/customers",
            admin(post(customers::create_customer).get(customers::list_customers)),
        )
        // GET/PUT/DELETE /customers/{customer_id}
        // Read is open to the owning customer; rename and soft delete are admin only.
        .route(
            "/customers/{customer_id}",
            get(customers::get_customer).merge(admin(
                put(customers::update_customer).delete(customers::delete_customer),
            )),
        )
        // --- Sites ---
        // GET/POST /customers/{customer_id}/sites
        .route(
            "/customers/{customer_id}/sites",
            get(sites::list_customer_sites).merge(admin(post(sites::create_site))),
        )
        // GET /sites
        .route("/sites", admin(get(sites::list_sites)))
        // GET/PUT/DELETE /sites/{site_id}
        .route(
            "/sites/{site_id}",
            get(sites::get_site).merge(admin(put(sites::update_site).delete(sites::delete_site))),
        )
        // --- Devices ---
        // POST /customers/{customer_id}/sites/{site_id}/devices
        // The site must belong to the customer in the path.
        .route(
            "/customers/{customer_id}/sites/{site_id}/devices",
            admin(post(devices::create_device)),
        )
        // GET /customers/{customer_id}/devices
        .route("/customers/{customer_id}/devices", get(devices::list_customer_devices))
        // GET /sites/{site_id}/devices
        .route("/sites/{site_id}/devices", get(devices::list_site_devices))
        // GET /devices
        // Admins see all devices, user tokens only their customer's.
        .route("/devices", get(devices::list_devices))
        // GET/PUT/DELETE /devices/{serial}
        // Lookup by serial also returns soft-deleted devices.
        .route(
            "/devices/{serial}",
            get(devices::get_device)
                .merge(admin(put(devices::update_device).delete(devices::delete_device))),
        )
        // GET/POST /devices/{serial}/statuses
        .route(
            "/devices/{serial}/statuses",
            get(devices::list_device_statuses).merge(admin(post(devices::record_device_status))),
        )
}
