use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct StatusRecord<'a> {
    order_id: &'a str,
    customer_id: &'a str,
    total: String,
    status: &'static str,
}

/// Writes `order_id,customer_id,total,status` rows.
pub struct StatusWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatusWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        for order in orders {
            self.writer.serialize(StatusRecord {
                order_id: &order.id,
                customer_id: &order.customer_id,
                total: order.total.normalize().to_string(),
                status: order.status.as_str(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
