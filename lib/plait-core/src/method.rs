//! The closed set of request methods plugins can see and set.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Request method of a [`crate::Request`].
///
/// Extension methods such as `PURGE` are not representable; adapters reject
/// them with [`Error::Conversion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
        Self::Trace,
        Self::Connect,
    ];

    /// Upper-case token, as sent on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }

    /// GET, HEAD, OPTIONS and TRACE.
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }

    /// The safe methods plus PUT and DELETE.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        self.is_safe() || matches!(self, Self::Put | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    /// Case-insensitive.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| Error::conversion(format!("unsupported HTTP method: {token}")))
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
            Method::Trace => Self::TRACE,
            Method::Connect => Self::CONNECT,
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = Error;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl TryFrom<http::Method> for Method {
    type Error = Error;

    fn try_from(method: http::Method) -> Result<Self, Self::Error> {
        Self::try_from(&method)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn tokens_round_trip_through_http() {
        for method in Method::ALL {
            let native = http::Method::from(method);
            check!(native.as_str() == method.to_string());
            let_assert!(Ok(back) = Method::try_from(&native));
            check!(back == method);
        }
    }

    #[test]
    fn parsing_ignores_case() {
        check!("get".parse::<Method>().ok() == Some(Method::Get));
        check!("oPtIoNs".parse::<Method>().ok() == Some(Method::Options));
    }

    #[test]
    fn extension_methods_are_rejected() {
        let_assert!(Ok(purge) = http::Method::from_bytes(b"PURGE"));
        let_assert!(Err(Error::Conversion(message)) = Method::try_from(purge));
        check!(message == "unsupported HTTP method: PURGE");
    }

    #[test]
    fn idempotency() {
        let idempotent: Vec<_> = Method::ALL
            .into_iter()
            .filter(Method::is_idempotent)
            .collect();
        check!(
            idempotent
                == [
                    Method::Get,
                    Method::Put,
                    Method::Delete,
                    Method::Head,
                    Method::Options,
                    Method::Trace
                ]
        );
        check!(!Method::Patch.is_safe());
    }
}
