//! Error types for the ISO-TP segmenter.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Data Too Large: {0} bytes")]
    DataTooLarge(usize),
    #[error("Fits In A Single Frame: {0} bytes")]
    NotSegmented(usize),
}
