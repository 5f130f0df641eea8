use std::io;

use thiserror::Error;

use crate::ip_range::IpRange;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IpRangeParseError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid prefix length: {0:?}")]
    InvalidPrefix(String),
    #[error("range mixes address families: {0:?}")]
    MixedFamilies(String),
    #[error("range ends before it starts: {0:?}")]
    Reversed(String),
}

/// Rejection reported by the platform interface builder.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("rejected argument: {0}")]
    InvalidArgument(String),
    #[error("unknown application: {0}")]
    UnknownApplication(String),
    #[error("platform failure: {0}")]
    Platform(String),
}

#[derive(Debug, Error)]
pub enum EstablishError {
    #[error("no profile set")]
    NoProfile,
    #[error("no interface was established yet")]
    NothingEstablished,
    #[error("platform rejected route {route}: {error}")]
    RouteRejected { route: IpRange, error: BuilderError },
    #[error("failed to apply interface configuration: {0}")]
    Builder(#[from] BuilderError),
    #[error("platform declined to establish the interface")]
    Declined,
    #[error("failed to start packet dropper: {0}")]
    Dropper(io::Error),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("connection controller has stopped")]
    Stopped,
    #[error("failed to spawn controller thread: {0}")]
    Spawn(io::Error),
}
