// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

//! Access to MUD-format muon-spin-rotation data files.
//!
//! MUD is the container format used for muSR run data at TRIUMF. One file
//! holds a run description, a list of comments, the per-detector histograms,
//! scaler totals, and independent variables (temperatures, fields, and the
//! like) that may carry a history of their values over the run.
//!
//! The main entry point is [`MudFile`], a read-only session on one file:
//!
//! ```rust,no_run
//! # fn main() -> Result<(), rubbl_mud::MudError> {
//! let mut mf = rubbl_mud::MudFile::open("006523.msr")?;
//! println!("{:?}", mf.get_subtitle()?);
//!
//! if let Some(hists) = mf.get_histograms()? {
//!     println!("{} bins in histogram \"forw\"", hists.get("forw")?.data.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Files can be produced with [`MudWriter`]. The byte layout this crate reads
//! and writes is described in the [`format`] module.

use std::path::PathBuf;
use thiserror::Error;

// Define this before any submodules are parsed.
macro_rules! muderr {
    ($( $fmt_args:expr ),*) => {
        Err($crate::MudError::Format(format!($( $fmt_args ),*)))
    }
}

pub mod decode;
pub mod directory;
pub mod encode;
pub mod format;
pub mod histogram;
pub mod numeric;
pub mod records;
pub mod session;

pub use encode::MudWriter;
pub use format::{ContainerKind, Family};
pub use histogram::{HistKey, Histogram, HistogramCollection};
pub use numeric::ElementKind;
pub use records::{
    Comment, HistoricalData, IndependentVariable, Measurement, RunDescription, Scaler,
};
pub use session::{MudFile, OpenMode, ReadOptions};

/// An error arising while opening, reading, or writing a MUD file.
#[derive(Error, Debug)]
pub enum MudError {
    #[error("no such file: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot open {} as a MUD file", .path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: Box<MudError>,
    },

    #[error("the MUD file has already been closed")]
    InvalidHandle,

    #[error("open mode \"{0}\" is not implemented; only reading (\"r\") is supported")]
    NotImplemented(String),

    #[error("{family} index {index} is out of range; the file has {count}")]
    IndexOutOfRange {
        family: Family,
        index: usize,
        count: usize,
    },

    #[error("no histogram matching {0}")]
    NotFound(HistKey),

    #[error("invalid histogram key {0:?}")]
    InvalidKey(String),

    #[error("histogram key {key} matches {count} histograms")]
    AmbiguousKey { key: HistKey, count: usize },

    #[error("invalid read option: {0}")]
    InvalidConfig(String),

    #[error("unsupported {size}-byte {kind} element width")]
    UnsupportedWidth { size: usize, kind: ElementKind },

    #[error("expected {expected} bytes of array data but only {actual} are available")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl MudError {
    /// Whether this error leaves the session unusable.
    ///
    /// Caller and format errors only affect the operation that raised them;
    /// the same session can go on to answer other queries.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            MudError::FileNotFound(_)
                | MudError::OpenFailed { .. }
                | MudError::InvalidHandle
                | MudError::Io(_)
        )
    }
}
