use xradio_proto::model::UnknownSignal;

/// Conditions that end the session with exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("{attempts} failed attempts when retrieving {what}, last error: {last}")]
    RetriesExhausted {
        what: &'static str,
        attempts: u32,
        last: String,
    },
    #[error("wrong channel id specified {attempts} times")]
    ChannelSelection { attempts: u32 },
    #[error("initialization failed: {0}")]
    Init(String),
}

/// Why a caught signal produced no action.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("signal arrived inside the debounce window")]
    Debounced,
    #[error(transparent)]
    Unknown(#[from] UnknownSignal),
}
