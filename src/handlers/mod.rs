// handlers/mod.rs - Three access tiers
//
// Public (no session) → Protected (bearer session, approval, permission
// checks per route) → Admin (role admin, enforced by `require_admin` on the
// whole `/admin` router).

pub mod admin;
pub mod protected;
pub mod public;
