use crate::domain::request::{LineDraft, OrderDraft};
use crate::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

/// One line item of a batch order file.
///
/// Rows sharing a `request` value form one order; the header fields are taken
/// from the first row of the group.
#[derive(Debug, Deserialize)]
struct OrderRow {
    request: String,
    customer: String,
    email: String,
    currency: String,
    method: String,
    shipping_address: String,
    product: String,
    quantity: i64,
    #[serde(default)]
    unit_price: Option<Decimal>,
}

/// A row that could not be read, labelled with its `request` value or, when
/// that is blank, its line number.
#[derive(Debug)]
pub struct UnreadableRow {
    pub reference: String,
    pub error: AppError,
}

impl UnreadableRow {
    fn at(position: Option<&csv::Position>, error: impl Into<AppError>) -> Self {
        Self {
            reference: position.map(|p| format!("line {}", p.line())).unwrap_or_default(),
            error: error.into(),
        }
    }
}

/// Reads order requests from a CSV source.
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

    /// Groups rows into drafts, in order of each request's first appearance.
    ///
    /// Rows that fail to deserialize are reported in place; they do not poison
    /// the rest of the file.
    pub fn drafts(mut self) -> Vec<std::result::Result<OrderDraft, UnreadableRow>> {
        let headers = match self.reader.headers() {
            Ok(headers) => headers.clone(),
            Err(err) => return vec![Err(UnreadableRow::at(err.position().cloned().as_ref(), err))],
        };
        let request_column = headers.iter().position(|name| name == "request");

        let mut drafts: Vec<std::result::Result<OrderDraft, UnreadableRow>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in self.reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    drafts.push(Err(UnreadableRow::at(err.position().cloned().as_ref(), err)));
                    continue;
                }
            };
            let row = match record.deserialize::<OrderRow>(Some(&headers)) {
                Ok(row) => row,
                Err(err) => {
                    let mut unreadable = UnreadableRow::at(record.position(), err);
                    if let Some(request) = request_column
                        .and_then(|column| record.get(column))
                        .filter(|request| !request.is_empty())
                    {
                        unreadable.reference = request.to_string();
                    }
                    drafts.push(Err(unreadable));
                    continue;
                }
            };

            let line = LineDraft {
                product_id: row.product,
                quantity: row.quantity,
                unit_price: row.unit_price,
            };
            if let Some(&slot) = index.get(&row.request)
                && let Some(Ok(draft)) = drafts.get_mut(slot)
            {
                draft.items.push(line);
                continue;
            }

            index.insert(row.request.clone(), drafts.len());
            drafts.push(Ok(OrderDraft {
                reference: row.request,
                customer_id: row.customer,
                customer_email: row.email,
                currency: row.currency,
                payment_method: row.method,
                shipping_address: row.shipping_address,
                items: vec![line],
            }));
        }

        drafts
    }
}
