//! Shared constants used across the crate.

/// User agent of the official Android client; the app API rejects others.
pub const APP_USER_AGENT: &str = "PixivAndroidApp/5.0.234 (Android 11; Pixel 5)";

/// Default app API host.
pub const APP_API_BASE: &str = "https://app-api.pixiv.net";

/// OAuth token endpoint used for refresh-token logins.
pub const AUTH_TOKEN_URL: &str = "https://oauth.secure.pixiv.net/auth/token";

/// OAuth client credentials of the Android app.
pub const CLIENT_ID: &str = "MOBrBDS8blbauoSck0ZfDbtuzpyT";
pub const CLIENT_SECRET: &str = "lsACyCD94FhDUtGTXi3QzcFE2uU1hqtDaKeqrdwj";

/// Image host; requests need a matching referer.
pub const IMAGE_HOST: &str = "i.pximg.net";
pub const IMAGE_REFERER: &str = "https://app-api.pixiv.net/";

/// Placeholder served in listings when the item detail is withheld.
pub const DETAIL_UNKNOWN_PLACEHOLDER: &str = "limit_unknown_360.png";

/// Attempts made for a transient failure before giving up.
pub const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Delay before retrying a failed credential refresh.
pub const AUTH_RETRY_DELAY_SECS: u64 = 60;
