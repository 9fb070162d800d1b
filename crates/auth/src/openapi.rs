// OpenAPI specification generation
//
// Served by the auth backend at /api-doc/openapi.json and printed by the
// export-openapi binary for documentation builds.

use crate::routes;
use utoipa::OpenApi;

/// OpenAPI documentation for the Otter auth backend
#[derive(OpenApi)]
#[openapi(
    paths(
        routes::signup,
        routes::login,
        routes::google_login,
        routes::refresh,
        routes::logout,
        routes::current_user,
        routes::profile_picture,
    ),
    components(
        schemas(
            routes::SignupRequest,
            routes::LoginRequest,
            routes::GoogleLoginRequest,
            routes::RefreshRequest,
            routes::AuthResponse,
            routes::MessageResponse,
            routes::UserResponse,
        )
    ),
    tags(
        (name = "auth", description = "Sign-in, token refresh and user endpoints")
    ),
    info(
        title = "Otter Auth API",
        version = "0.1.0",
        description = "Issues and refreshes the tokens the Otter gateway verifies",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> anyhow::Result<String> {
        Ok(Self::openapi().to_pretty_json()?)
    }
}
