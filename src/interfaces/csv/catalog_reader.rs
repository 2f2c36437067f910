use crate::domain::product::Product;
use crate::error::{AppError, Result};
use std::io::Read;

/// Reads catalog rows (`id,name,price,available`) from a CSV source.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AppError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_catalog() {
        let data = "id, name, price, available\nmug, Mug, 12.99, true\nposter, Poster, 4.99, false";
        let products: Vec<Product> = CatalogReader::new(data.as_bytes())
            .products()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price, dec!(12.99));
        assert!(!products[1].available);
    }

    #[test]
    fn test_reader_bad_price() {
        let data = "id,name,price,available\nmug,Mug,cheap,true";
        let results: Vec<Result<Product>> = CatalogReader::new(data.as_bytes()).products().collect();
        assert!(results[0].is_err());
    }
}
