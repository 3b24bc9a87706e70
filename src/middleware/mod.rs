pub mod guard;
pub mod request_context;
pub mod response;

pub use guard::{
    record_activity, require_admin, require_permission, require_role, require_role_and_permission, require_session,
    AuthorizedCaller, RoleRequirement,
};
pub use request_context::RequestContext;
pub use response::{ApiResponse, ApiResult};
