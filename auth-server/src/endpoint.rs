//! Request handling
//!
//! Each request is validated for shape first; errors from the identity
//! service are passed back to the caller unchanged.

use auth::rpc::{Request, Response};
use auth::{IdentityService, KeySpec};

/// Handle one decoded request
pub fn handle(svc: &dyn IdentityService, req: Request) -> Response {
    if let Err(e) = req.validate() {
        log::debug!("Rejected request: {}", e);
        return Response::error(&e);
    }

    match req {
        Request::Issue { issuer, key_type } => issue(svc, &issuer, key_type),
        Request::Identify { token } => identify(svc, &token),
        Request::CanAccess { resource_id, token } => can_access(svc, &resource_id, &token),
        Request::Revoke { issuer, id } => match svc.revoke(&issuer, &id) {
            Ok(()) => Response::Revoked,
            Err(e) => Response::error(&e),
        },
    }
}

fn issue(svc: &dyn IdentityService, issuer: &str, key_type: u32) -> Response {
    match svc.issue(issuer, KeySpec::new(key_type)) {
        Ok(key) => Response::Issued {
            id: key.id,
            secret: key.secret.unwrap_or_default(),
        },
        Err(e) => Response::error(&e),
    }
}

fn identify(svc: &dyn IdentityService, token: &str) -> Response {
    match svc.identify(token) {
        Ok(id) => Response::Identity { id },
        Err(e) => Response::error(&e),
    }
}

// Any valid key may act on any named resource; the resolved owner is the
// publisher. An empty resource id never reaches here.
fn can_access(svc: &dyn IdentityService, resource_id: &str, token: &str) -> Response {
    match svc.identify(token) {
        Ok(id) => {
            log::debug!("Granted '{}' access to resource '{}'", id, resource_id);
            Response::Identity { id }
        }
        Err(e) => {
            log::debug!("Denied access to resource '{}': {}", resource_id, e);
            Response::error(&e)
        }
    }
}
