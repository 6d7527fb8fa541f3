mod manifest;
mod timefmt;
mod transaction;
mod uri_info;

pub use manifest::{FileCopy, Manifest};
pub use timefmt::{parse_timestamp, to_timestamp, TIMESTAMP_FORMAT};
pub use transaction::{Transaction, TransactionRecord, TransactionStatus};
pub use uri_info::{normalize_uri, UriInfo, UriStatus, UNKNOWN_URI_ERROR};

#[cfg(test)]
mod tests;
