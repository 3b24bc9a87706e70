// handlers/protected/mod.rs - Session-bearing endpoints under /api
//
// Each handler runs its own guard call: session only, approved role, or an
// evaluator check against a resource path.

pub mod access_requests; // GET/POST /api/tool-access-requests
pub mod permissions; // POST /api/permissions/check
pub mod session; // POST /api/session/sign-in, GET /api/me
pub mod tools; // GET /api/tools/*path
pub mod units; // GET /api/units/:id/members
