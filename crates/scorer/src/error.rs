use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Input is not a well-formed sequence of transaction records.
    #[error("data format error{}: {reason}", record_suffix(.index))]
    DataFormat {
        /// Zero-based record position, when the failure is tied to one record.
        index: Option<usize>,
        reason: String,
    },

    /// A derived feature or combined score overflowed to NaN or infinity.
    #[error("non-finite {column} for wallet {wallet}")]
    NonFinite { wallet: String, column: String },

    #[error("input contains no transactions")]
    EmptyInput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn data_format(index: usize, reason: impl Into<String>) -> Self {
        Self::DataFormat {
            index: Some(index),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::DataFormat {
            index: None,
            reason: err.to_string(),
        }
    }
}

fn record_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" in record {i}")).unwrap_or_default()
}
