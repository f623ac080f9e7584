//! Error classification.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification code carried by every [`TebexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A user identifier is required but none is stored.
    NotAuthenticated,

    /// The basket does not exist, or no basket identifier is stored.
    BasketNotFound,

    /// The basket was completed or expired on the server.
    BasketExpired,

    /// The requested package does not exist.
    PackageNotFound,

    /// The requested category does not exist.
    CategoryNotFound,

    /// The coupon code was rejected.
    InvalidCoupon,

    /// The coupon code is no longer valid.
    CouponExpired,

    /// The gift card number was rejected.
    InvalidGiftCard,

    /// The creator code was rejected.
    InvalidCreatorCode,

    /// Connectivity or fetch failure.
    NetworkError,

    /// The request timed out.
    Timeout,

    /// The server rate limited the request.
    RateLimited,

    /// The client was constructed with unusable configuration.
    ConfigInvalid,

    /// Anything the classifier could not place.
    Unknown,
}

impl ErrorCode {
    /// Machine-readable name, as serialised.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::BasketNotFound => "BASKET_NOT_FOUND",
            Self::BasketExpired => "BASKET_EXPIRED",
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::CategoryNotFound => "CATEGORY_NOT_FOUND",
            Self::InvalidCoupon => "INVALID_COUPON",
            Self::CouponExpired => "COUPON_EXPIRED",
            Self::InvalidGiftCard => "INVALID_GIFT_CARD",
            Self::InvalidCreatorCode => "INVALID_CREATOR_CODE",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Best-effort keyword classification of a failure message.
    ///
    /// Matching is case-insensitive and the first matching rule wins, so
    /// transport keywords take precedence over resource keywords.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |needle: &str| message.contains(needle);

        if has("network") || has("fetch") {
            Self::NetworkError
        } else if has("timeout") || has("timed out") {
            Self::Timeout
        } else if has("rate limit") || has("429") || has("too many requests") {
            Self::RateLimited
        } else if has("basket") && has("not found") {
            Self::BasketNotFound
        } else if has("basket") && (has("expired") || has("complete")) {
            Self::BasketExpired
        } else if has("package") && has("not found") {
            Self::PackageNotFound
        } else if has("category") && has("not found") {
            Self::CategoryNotFound
        } else if has("coupon") && has("expired") {
            Self::CouponExpired
        } else if has("coupon") && has("invalid") {
            Self::InvalidCoupon
        } else if (has("gift card") || has("giftcard")) && has("invalid") {
            Self::InvalidGiftCard
        } else if has("creator code") && has("invalid") {
            Self::InvalidCreatorCode
        } else if has("unauthori") || has("not authenticated") {
            Self::NotAuthenticated
        } else {
            Self::Unknown
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A failure normalised into one [`ErrorCode`] plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct TebexError {
    /// Stable classification code.
    pub code: ErrorCode,

    /// Human-readable message.
    pub message: String,
}

impl TebexError {
    /// Construct a classified error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// No user identifier is stored.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::new(
            ErrorCode::NotAuthenticated,
            "a user identifier is required to modify the basket",
        )
    }

    /// No basket identifier is stored, or the stored basket is complete.
    #[must_use]
    pub fn basket_not_found() -> Self {
        Self::new(ErrorCode::BasketNotFound, "no active basket")
    }

    /// Constructor-time configuration failure.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Whether the read path may retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NetworkError | ErrorCode::Timeout | ErrorCode::RateLimited
        )
    }
}

/// Raw failure of a remote call, before classification.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("request failed with status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,

        /// Server supplied detail, or the raw body.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// An already classified error.
    #[error(transparent)]
    Classified(#[from] TebexError),
}

/// Classify a raw remote failure.
///
/// Already classified errors pass through unchanged.
pub fn classify(error: ApiError) -> TebexError {
    match error {
        ApiError::Classified(error) => error,
        ApiError::Http(source) if source.is_timeout() => {
            TebexError::new(ErrorCode::Timeout, source.to_string())
        }
        ApiError::Http(source) if source.is_connect() || source.is_request() => {
            TebexError::new(ErrorCode::NetworkError, source.to_string())
        }
        ApiError::Status {
            status: 429,
            message,
        } => TebexError::new(ErrorCode::RateLimited, message),
        other => {
            let message = other.to_string();

            TebexError::new(ErrorCode::from_message(&message), message)
        }
    }
}

impl From<ApiError> for TebexError {
    fn from(error: ApiError) -> Self {
        classify(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: &str) -> ApiError {
        ApiError::Status {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn classified_errors_pass_through_unchanged() {
        let original = TebexError::new(ErrorCode::InvalidCoupon, "coupon TEST10 is invalid");

        let classified = classify(ApiError::from(original.clone()));

        assert_eq!(classified, original);
        assert_eq!(classify(ApiError::from(classified.clone())), classified);
    }

    #[test]
    fn keyword_rules_map_to_codes() {
        let cases = [
            ("Failed to fetch", ErrorCode::NetworkError),
            ("network unreachable", ErrorCode::NetworkError),
            ("Request timeout after 30s", ErrorCode::Timeout),
            ("Rate limit exceeded", ErrorCode::RateLimited),
            ("Basket not found", ErrorCode::BasketNotFound),
            ("This basket has expired", ErrorCode::BasketExpired),
            ("Package not found", ErrorCode::PackageNotFound),
            ("Category not found", ErrorCode::CategoryNotFound),
            ("Coupon has expired", ErrorCode::CouponExpired),
            ("Invalid coupon code", ErrorCode::InvalidCoupon),
            ("Invalid gift card", ErrorCode::InvalidGiftCard),
            ("Invalid creator code", ErrorCode::InvalidCreatorCode),
            ("Unauthorized", ErrorCode::NotAuthenticated),
            ("something else entirely", ErrorCode::Unknown),
        ];

        for (message, expected) in cases {
            assert_eq!(
                ErrorCode::from_message(message),
                expected,
                "unexpected classification for {message:?}"
            );
        }
    }

    #[test]
    fn status_message_is_classified_by_keywords() {
        let error = classify(status(404, "Basket not found"));

        assert_eq!(error.code, ErrorCode::BasketNotFound);
        assert!(
            error.message.contains("404"),
            "message should keep the status, got {}",
            error.message
        );
    }

    #[test]
    fn too_many_requests_status_is_rate_limited() {
        let error = classify(status(429, "slow down"));

        assert_eq!(error.code, ErrorCode::RateLimited);
        assert!(error.is_retryable(), "rate limited errors should be retryable");
    }

    #[test]
    fn server_error_without_keywords_is_unknown() {
        let error = classify(status(500, "Internal Server Error"));

        assert_eq!(error.code, ErrorCode::Unknown);
        assert!(!error.is_retryable(), "unknown errors should not be retried");
    }

    #[test]
    fn codes_serialise_as_stable_names() -> serde_json::Result<()> {
        let json = serde_json::to_string(&TebexError::basket_not_found())?;

        assert!(
            json.contains("\"BASKET_NOT_FOUND\""),
            "unexpected serialisation {json}"
        );
        assert_eq!(ErrorCode::RateLimited.to_string(), "RATE_LIMITED");

        Ok(())
    }
}
