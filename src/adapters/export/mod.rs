//! Archive encoders. Turn motion records into JSON or CSV documents.

pub mod csv_utils;

pub use csv_utils::{records_to_csv, records_to_json};
