use std::fmt;

use reqwest::{header::HeaderMap, StatusCode};
use thiserror::Error;

use crate::{decode::DecodeError, TransportError, TransportResponse};

const ERROR_CODE_HEADER: &str = "errorcode";
const ERROR_DESCRIPTION_HEADER: &str = "errordescription";

/// A numeric error code reported by the portal in the `errorcode` header
///
/// Codes are four digits; the first three identify the [`ErrorFamily`]. Codes
/// not known to this crate are still representable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorCode(u16);

macro_rules! error_codes {
    ($($(#[$meta:meta])* $name:ident = $value:literal;)*) => {
        impl ErrorCode {
            $(
                $(#[$meta])*
                pub const $name: Self = Self($value);
            )*

            /// The symbolic name of a known code
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    /// A bad request with no more specific code
    UNSPECIFIED_BAD_REQUEST = 4000;
    /// A required parameter was not supplied
    PARAMETER_MISSING = 4001;
    /// The resource being created already exists
    DUPLICATE_RESOURCE = 4002;
    /// A parameter failed validation
    VALIDATION_ERROR = 4003;
    /// The action requires a different kind of user
    INCORRECT_USER_TYPE = 4004;
    /// The parameters are individually valid but cannot be used together
    PARAMETERS_UNUSABLE = 4005;
    /// The requested action cannot be performed
    ACTION_IMPOSSIBLE = 4006;
    /// The payload exceeds the permitted size
    ABOVE_DATA_LIMIT = 4007;
    /// The token has already been consumed
    TOKEN_ALREADY_USED = 4008;
    /// Content was held for moderation
    CONTENT_FLAGGED_FOR_MODERATION = 4009;
    /// The access token has expired and must be refreshed
    TOKEN_REFRESH_REQUIRED = 4010;
    /// The supplied credentials are invalid
    INVALID_CREDENTIALS = 4011;
    /// The application's key is invalid
    API_KEY_INVALID = 4012;
    /// The account is under moderation
    ACCOUNT_UNDER_MODERATION = 4013;
    /// The user lacks the required permissions
    INSUFFICIENT_PERMISSIONS = 4014;
    /// The authorization code is malformed
    AUTHORIZATION_CODE_MALFORMED = 4015;
    /// No authorization was supplied
    AUTHORIZATION_MISSING = 4016;
    /// The requested scope is not registered for the application
    REQUESTED_SCOPE_NOT_REGISTERED = 4017;
    /// Notifications are not enabled for the device
    NOTIFICATIONS_NOT_ENABLED_FOR_DEVICE = 4018;
    /// The user attempted an action they are not permitted to perform
    USER_ATTEMPTED_UNAUTHORIZED_ACTION = 4032;
    /// The authorization request is missing a parameter
    AUTHORIZATION_REQUEST_MISSING_PARAMETER = 4033;
    /// The authorization token is invalid
    AUTHORIZATION_TOKEN_INVALID = 4034;
    /// An anonymous user attempted an action that requires an account
    ANONYMOUS_USER_ATTEMPTED_UNAUTHORIZED_ACTION = 4035;
    /// The resource does not exist
    RESOURCE_NOT_FOUND = 4042;
    /// The resource already exists
    ALREADY_EXISTS = 4091;
    /// The raffle has ended
    RAFFLE_ENDED = 4101;
    /// The raffle has not started
    RAFFLE_NOT_STARTED = 4102;
    /// Too many raffle requests were made
    TOO_MANY_RAFFLE_REQUESTS = 4291;
    /// An adult or parent has not accepted the current privacy policy
    ADULT_PARENT_OUTDATED_PRIVACY_POLICY = 4511;
    /// A kid's account is on an outdated privacy policy
    KID_OUTDATED_PRIVACY_POLICY = 4512;
    /// An internal error with no more specific code
    UNSPECIFIED_INTERNAL_ERROR = 5000;
    /// Data could not be saved
    FAILED_TO_SAVE_DATA = 5001;
    /// Data could not be updated
    FAILED_TO_UPDATE_DATA = 5002;
    /// An internal process failed
    INTERNAL_PROCESS_FAILED = 5003;
    /// Internal data is missing or corrupted
    INTERNAL_DATA_MISSING_OR_CORRUPTED = 5004;
    /// A partner's process failed
    PARTNER_PROCESS_FAILED = 5005;
    /// This version of the application is no longer supported
    APP_VERSION_NOT_SUPPORTED = 5051;
}

impl ErrorCode {
    /// Wraps a raw code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The raw numeric code
    pub const fn get(self) -> u16 {
        self.0
    }

    /// The family the code belongs to
    pub fn family(self) -> ErrorFamily {
        match self.0 / 10 {
            400 => ErrorFamily::BadRequest,
            401 => ErrorFamily::Unauthorized,
            403 => ErrorFamily::Forbidden,
            404 => ErrorFamily::NotFound,
            409 => ErrorFamily::Conflict,
            410 => ErrorFamily::Gone,
            429 => ErrorFamily::RateLimited,
            451 => ErrorFamily::Policy,
            500 => ErrorFamily::ServerError,
            505 => ErrorFamily::VersionNotSupported,
            _ => ErrorFamily::Other,
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "ErrorCode({})", self.0),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The broad category of an [`ErrorCode`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorFamily {
    /// `400x`
    BadRequest,
    /// `401x`
    Unauthorized,
    /// `403x`
    Forbidden,
    /// `404x`
    NotFound,
    /// `409x`
    Conflict,
    /// `410x`
    Gone,
    /// `429x`
    RateLimited,
    /// `451x`, policy acceptance required
    Policy,
    /// `500x`
    ServerError,
    /// `505x`
    VersionNotSupported,
    /// Any code outside the known families
    Other,
}

/// The classified outcome of a failed portal call
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received
    #[error("transport failure")]
    Transport(#[from] TransportError),
    /// The access token has expired
    ///
    /// Calls made through a gateway only see this if the refresh that follows
    /// it fails.
    #[error("access credential expired: {description}")]
    ExpiredCredential {
        /// The description supplied by the portal, if any
        description: String,
    },
    /// The portal reported an error
    #[error("portal error {code}: {description}")]
    Api {
        /// The reported code
        code: ErrorCode,
        /// The reported description
        description: String,
    },
    /// A successful response did not match the requested shape
    #[error("response did not match the expected shape")]
    Deserialization(#[from] DecodeError),
    /// A response arrived without a usable error code
    #[error("unrecognized response with status {status}")]
    Unknown {
        /// The response status
        status: StatusCode,
    },
}

impl ApiError {
    /// The code reported by the portal, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::ExpiredCredential { .. } => Some(ErrorCode::TOKEN_REFRESH_REQUIRED),
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure warrants a credential refresh
    pub fn is_expired_credential(&self) -> bool {
        matches!(self, Self::ExpiredCredential { .. })
    }
}

/// Classifies the outcome of a call that did not succeed
///
/// A missing response is a transport failure. Otherwise the `errorcode` and
/// `errordescription` headers decide: `4010` is an expired credential, any
/// other code with a description is an API error, and anything else is
/// unknown.
pub fn classify(
    transport_error: Option<TransportError>,
    response: Option<&TransportResponse>,
) -> ApiError {
    let response = match (transport_error, response) {
        (Some(err), _) => return ApiError::Transport(err),
        (None, None) => return ApiError::Transport(TransportError::new("no response received")),
        (None, Some(response)) => response,
    };

    let code = match header_str(&response.headers, ERROR_CODE_HEADER)
        .and_then(|raw| raw.trim().parse::<u16>().ok())
    {
        Some(code) => ErrorCode(code),
        None => {
            return ApiError::Unknown {
                status: response.status,
            }
        }
    };

    let description = header_str(&response.headers, ERROR_DESCRIPTION_HEADER).map(str::to_owned);

    if code == ErrorCode::TOKEN_REFRESH_REQUIRED {
        return ApiError::ExpiredCredential {
            description: description.unwrap_or_default(),
        };
    }

    match description {
        Some(description) => ApiError::Api { code, description },
        None => ApiError::Unknown {
            status: response.status,
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
