//! CSV input of order submissions and CSV output of final order statuses.

pub mod order_reader;
pub mod status_writer;
