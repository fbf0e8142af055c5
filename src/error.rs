//! Command-Line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not set up logging")]
    Logging,
    /// The account could not be prepared before signing in.
    #[display("could not prepare account `{_0}`")]
    Account(#[error(not(source))] String),
    #[display("could not load folders")]
    SignIn,
    #[display("command failed")]
    Command,
    #[display("could not write output")]
    Output,
}
