pub mod discovery;
pub mod gateway;
pub mod health;

use actix_web::web;

/// Mount every route. Fixed prefixes go first; the owner/api catch-all last.
///
/// `/x402/...` shadows a GET to an owner named `x402`, so that username is
/// refused at creation (see [`crate::db::RESERVED_USERNAMES`]).
pub fn configure(cfg: &mut web::ServiceConfig) {
    health::configure(cfg);
    discovery::configure(cfg);
    gateway::configure(cfg);
}
