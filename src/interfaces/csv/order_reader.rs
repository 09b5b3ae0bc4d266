use crate::error::{DispatchError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One order submission as it appears in the input file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderRow {
    pub customer_id: String,
    pub total: Decimal,
    /// Item names separated by `;`.
    #[serde(default)]
    pub items: Option<String>,
}

impl OrderRow {
    pub fn item_list(&self) -> Vec<String> {
        self.items
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Reads order submissions from a CSV source with a
/// `customer_id,total,items` header.
///
/// Whitespace is trimmed and rows may omit the trailing `items` column.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error and reading
    /// continues with the next one.
    pub fn orders(self) -> impl Iterator<Item = Result<OrderRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(DispatchError::from))
    }
}
