use crate::rmi;

use core::fmt;

/// Status occupies bits [7:0] of x0, the index bits [15:8].
const STATUS_MASK: usize = 0xff;
const INDEX_SHIFT: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    RmiErrorInput,
    RmiErrorRealm(usize),
    RmiErrorRec,
    /// Walk stopped at the level carried in the index.
    RmiErrorRtt(usize),
    RmiErrorNotSupported,
    RmiErrorDevice,
    /// Walk of an auxiliary tree stopped at the level carried in the index.
    RmiErrorRttAux(usize),
    //// The below is the raw status word of codes we don't decode
    RmiErrorOthers(usize),
}

impl From<Error> for usize {
    fn from(err: Error) -> Self {
        match err {
            Error::RmiErrorInput => rmi::ERROR_INPUT,
            Error::RmiErrorRealm(index) => rmi::ERROR_REALM | (index << INDEX_SHIFT),
            Error::RmiErrorRec => rmi::ERROR_REC,
            Error::RmiErrorRtt(level) => rmi::ERROR_RTT | (level << INDEX_SHIFT),
            Error::RmiErrorNotSupported => rmi::ERROR_NOT_SUPPORTED,
            Error::RmiErrorDevice => rmi::ERROR_DEVICE,
            Error::RmiErrorRttAux(level) => rmi::ERROR_RTT_AUX | (level << INDEX_SHIFT),
            Error::RmiErrorOthers(raw) => raw,
        }
    }
}

impl Error {
    /// Decodes the status word returned in x0. `None` stands for RMI_SUCCESS.
    pub fn from_status(ret: usize) -> Option<Self> {
        let index = (ret >> INDEX_SHIFT) & STATUS_MASK;
        let err = match ret & STATUS_MASK {
            rmi::SUCCESS => return None,
            rmi::ERROR_INPUT => Error::RmiErrorInput,
            rmi::ERROR_REALM => Error::RmiErrorRealm(index),
            rmi::ERROR_REC => Error::RmiErrorRec,
            rmi::ERROR_RTT => Error::RmiErrorRtt(index),
            rmi::ERROR_NOT_SUPPORTED => Error::RmiErrorNotSupported,
            rmi::ERROR_DEVICE => Error::RmiErrorDevice,
            rmi::ERROR_RTT_AUX => Error::RmiErrorRttAux(index),
            _ => Error::RmiErrorOthers(ret),
        };
        Some(err)
    }

    pub fn status(&self) -> usize {
        usize::from(*self) & STATUS_MASK
    }

    pub fn index(&self) -> usize {
        (usize::from(*self) >> INDEX_SHIFT) & STATUS_MASK
    }
}

pub fn to_result(ret: usize) -> Result<(), Error> {
    match Error::from_status(ret) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (status {:#x})", self, usize::from(*self))
    }
}

impl std::error::Error for Error {}
