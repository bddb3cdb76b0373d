/// Router Module Index
///
/// Organizes routing by access level. Access control is applied as layers on these
/// routers (see `create_router`), so a handler is never reachable without its gate.

/// Routes open to any client: health and session establishment.
pub mod public;

/// Routes behind the `Authorization` session cookie. Mutating and global listing
/// routes additionally carry the `admin_only` route layer.
pub mod authenticated;

/// Token issuance routes, nested under `/admin` and gated by the `Admin-Secret` header.
pub mod admin;
