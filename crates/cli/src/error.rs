use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("unable to open the {_0}")]
    Setup(#[error(not(source))] &'static str),
    #[display("command failed")]
    Library,
    #[display("unable to write {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
}
