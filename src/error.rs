use thiserror::Error;

pub type AudioLevelResult<T> = Result<T, AudioLevelError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AudioLevelError {
    /// The negotiated extension attribute wasn't one we understand.  The prior state is kept.
    #[error("Invalid attribute: '{0}'")]
    InvalidAttribute(String),
    /// An unsupported header extension form was requested or the buffer given was too small
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
