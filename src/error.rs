use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    // Wire decoding. The responder treats every one of these as a malformed
    // packet: drop, count, carry on.
    #[error("insufficient data for base length type")]
    ErrBaseLen,
    #[error("insufficient data for calculated length type")]
    ErrCalcLen,
    #[error("segment prefix is reserved")]
    ErrReserved,
    #[error("too many compression pointers")]
    ErrTooManyPtr,
    #[error("invalid compression pointer")]
    ErrInvalidPtr,
    #[error("name exceeds 255 bytes")]
    ErrNameTooLong,
    #[error("name segment exceeds 63 bytes")]
    ErrSegTooLong,
    #[error("zero length name segment")]
    ErrZeroSegLen,
    #[error("resource length mismatch")]
    ErrResourceLen,
    #[error("character string exceeds 255 bytes")]
    ErrStringTooLong,
    #[error("invalid utf-8 in character string")]
    ErrInvalidString,

    // Wire encoding.
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("resource body exceeds 65535 bytes")]
    ErrResTooLong,
    #[error("too many questions")]
    ErrTooManyQuestions,
    #[error("too many answers")]
    ErrTooManyAnswers,
    #[error("too many authorities")]
    ErrTooManyAuthorities,
    #[error("too many additionals")]
    ErrTooManyAdditionals,

    // Names.
    #[error("host name must not be empty")]
    ErrHostnameEmpty,
}

impl Error {
    /// Whether this error came out of `Message::unpack` chewing on bytes it
    /// could not make sense of, as opposed to an encoding-side failure.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::ErrBaseLen
                | Error::ErrCalcLen
                | Error::ErrReserved
                | Error::ErrTooManyPtr
                | Error::ErrInvalidPtr
                | Error::ErrNameTooLong
                | Error::ErrSegTooLong
                | Error::ErrZeroSegLen
                | Error::ErrResourceLen
                | Error::ErrStringTooLong
                | Error::ErrInvalidString
        )
    }
}
