// Authorization guard: may this principal reach this service?
// Decision: Fail closed; no principal is 401, missing entitlement is 403

use crate::{error::ApiError, principal::Principal};

/// Why access was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// No principal resolved
    Unauthorized,
    /// Authenticated, but the service is not in the entitlement set
    Forbidden,
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::Unauthorized => ApiError::Unauthorized,
            AccessDenied::Forbidden => ApiError::Forbidden,
        }
    }
}

/// Check a (possibly absent) principal against the requested service name.
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    service: &str,
) -> Result<&'a Principal, AccessDenied> {
    let principal = principal.ok_or(AccessDenied::Unauthorized)?;

    if !principal.is_entitled(service) {
        return Err(AccessDenied::Forbidden);
    }

    Ok(principal)
}
