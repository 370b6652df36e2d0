//! Access-token lifecycle: well-known credential keys, endpoint paths and
//! the single-flight refresh coordinator.

mod refresh;

pub use refresh::RefreshCoordinator;

/// Credential-store key for the short-lived access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Credential-store key for the long-lived refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Path of the refresh-token exchange endpoint. A failure on this path must
/// never trigger another refresh.
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";

/// Requests whose path contains this fragment never trigger a refresh.
pub const SIGNIN_PATH_FRAGMENT: &str = "signin";
