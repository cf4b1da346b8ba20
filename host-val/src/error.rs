use crate::rmi;
use crate::rmi::rtt;

use core::fmt;

#[derive(Debug)]
pub enum Error {
    Rmi(rmi::error::Error),
    Rtt(rtt::Error),
    Fixture(serde_json::Error),
    Io(std::io::Error),
    InvalidFixture(String),
}

impl From<rmi::error::Error> for Error {
    fn from(err: rmi::error::Error) -> Self {
        Error::Rmi(err)
    }
}

impl From<rtt::Error> for Error {
    fn from(err: rtt::Error) -> Self {
        Error::Rtt(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Fixture(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rmi(err) => write!(f, "{}", err),
            Error::Rtt(err) => write!(f, "{}", err),
            Error::Fixture(err) => write!(f, "malformed fixture: {}", err),
            Error::Io(err) => write!(f, "{}", err),
            Error::InvalidFixture(msg) => write!(f, "invalid fixture: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rmi(err) => Some(err),
            Error::Rtt(err) => Some(err),
            Error::Fixture(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::InvalidFixture(_) => None,
        }
    }
}
