pub mod types;

pub use types::{ConnectorError, CsvError, DataError, EtlError, TransferError};
