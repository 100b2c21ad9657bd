use std::fmt;

#[derive(Debug)]
pub enum Error {
    Auth(String),
    Http(reqwest::Error),
    HttpStatus { status: u16, body: String },
    MalformedResponse(String),
    Api(serde_json::Value),
    UnexpectedShape { expected: String, payload: String },
}

impl Error {
    /// True for failures of the network or HTTP layer rather than of the payload
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::HttpStatus { .. })
    }

    pub(crate) fn unexpected_shape(expected: impl Into<String>, payload: &serde_json::Value) -> Self {
        Error::UnexpectedShape {
            expected: expected.into(),
            payload: payload.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::HttpStatus { status, body } => {
                write!(f, "HTTP error: status {}: {}", status, body)
            }
            Error::MalformedResponse(body) => write!(f, "Cannot parse {} as JSON", body),
            Error::Api(value) => write!(f, "API error: {}", value),
            Error::UnexpectedShape { expected, payload } => {
                write!(f, "Unexpected response, missing {}: {}", expected, payload)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_classification() {
        let status = Error::HttpStatus {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(status.is_transport());
        assert!(!Error::Api(json!("boom")).is_transport());
        assert!(!Error::MalformedResponse("<html>".to_string()).is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::unexpected_shape("locations", &json!({"foo": 1}));
        assert_eq!(
            err.to_string(),
            r#"Unexpected response, missing locations: {"foo":1}"#
        );

        let err = Error::MalformedResponse("not json".to_string());
        assert_eq!(err.to_string(), "Cannot parse not json as JSON");

        let err = Error::Api(json!("invalid_request"));
        assert_eq!(err.to_string(), r#"API error: "invalid_request""#);
    }
}
