//! Shared constants and invariants

pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TOKEN_PATH: &str = "./data/refresh_token";

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://my.tado.com/api/v2";
pub const DEFAULT_AUTH_TOKEN_URL: &str = "https://login.tado.com/oauth2/token";
pub const DEFAULT_AUTH_DEVICE_URL: &str = "https://login.tado.com/oauth2/device_authorize";
pub const DEFAULT_AUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
pub const DEFAULT_AUTH_SCOPE: &str = "offline_access";

// OAuth grant types
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
