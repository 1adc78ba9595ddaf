use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CSV_HEADERS: [&str; 6] = [
    "product_id",
    "product_title",
    "rating",
    "total_reviews",
    "price",
    "top_reviews",
];

/// Placeholder for fields the storefront markup didn't yield.
pub const NOT_AVAILABLE: &str = "N/A";
/// Review column sentinel when a product page produced no review text.
pub const NO_REVIEWS_FOUND: &str = "No reviews found";
/// Review column sentinel when the detail link couldn't be resolved.
pub const INVALID_PRODUCT_URL: &str = "Invalid product URL";
/// Separator between review snippets inside the `top_reviews` column.
pub const REVIEW_SEPARATOR: &str = " || ";

/// One scraped product. `top_reviews` always holds either joined review
/// snippets or one of the sentinels, never an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub product_title: String,
    pub rating: String,
    pub total_reviews: String,
    pub price: String,
    pub top_reviews: String,
}

impl ProductRecord {
    fn as_row(&self) -> [&str; 6] {
        [
            &self.product_id,
            &self.product_title,
            &self.rating,
            &self.total_reviews,
            &self.price,
            &self.top_reviews,
        ]
    }
}

/// Resolve where a CSV file lives, given the configured output directory.
///
/// Absolute paths and paths with directory components are taken as-is; a
/// bare filename lands under `output_dir`.
pub fn resolve_csv_path(filename: &str, output_dir: &str) -> PathBuf {
    let path = Path::new(filename);

    if path.is_absolute() || path.components().count() > 1 {
        path.to_path_buf()
    } else {
        Path::new(output_dir).join(path)
    }
}

/// Write records to a CSV file with the fixed header, overwriting any
/// previous content. Parent directories are created as needed.
pub fn save_to_csv(
    records: &[ProductRecord],
    filename: &str,
    output_dir: &str,
) -> anyhow::Result<PathBuf> {
    let path = resolve_csv_path(filename, output_dir);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut csv_wrt = csv::Writer::from_path(&path)?;
    csv_wrt.write_record(CSV_HEADERS)?;
    for record in records {
        csv_wrt.write_record(record.as_row())?;
    }
    csv_wrt.flush()?;

    log::info!("wrote {} records to {}", records.len(), path.display());

    Ok(path)
}

/// Read records back from a CSV file.
///
/// The header must contain every column in [`CSV_HEADERS`]; extra columns
/// are tolerated and column order is not significant.
pub fn load_from_csv(path: &Path) -> anyhow::Result<Vec<ProductRecord>> {
    let mut csv_reader = csv::Reader::from_path(path)?;

    let headers = csv_reader.headers()?.clone();
    let mut indices = [0usize; 6];
    for (slot, column) in indices.iter_mut().zip(CSV_HEADERS) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| anyhow::anyhow!("{}: missing column '{column}'", path.display()))?;
    }

    let mut records = vec![];
    for row in csv_reader.records() {
        let row = row?;
        let field = |idx: usize| row.get(indices[idx]).unwrap_or_default().to_string();

        records.push(ProductRecord {
            product_id: field(0),
            product_title: field(1),
            rating: field(2),
            total_reviews: field(3),
            price: field(4),
            top_reviews: field(5),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_filename_under_output_dir() {
        let path = resolve_csv_path("x.csv", "data");
        assert_eq!(path, Path::new("data").join("x.csv"));
    }

    #[test]
    fn test_resolve_absolute_path_as_is() {
        let path = resolve_csv_path("/tmp/x.csv", "data");
        assert_eq!(path, Path::new("/tmp/x.csv"));
    }

    #[test]
    fn test_resolve_relative_dir_path_as_is() {
        let path = resolve_csv_path("out/x.csv", "data");
        assert_eq!(path, Path::new("out/x.csv"));
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "product_id,product_title\nitm1,Phone\n").unwrap();

        let err = load_from_csv(&path).unwrap_err();
        assert!(err.to_string().contains("rating"));
    }

    #[test]
    fn test_load_tolerates_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.csv");
        std::fs::write(
            &path,
            "extra,product_id,product_title,rating,total_reviews,price,top_reviews\n\
             x,itm1,Phone,4.5,10,999,No reviews found\n",
        )
        .unwrap();

        let records = load_from_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_id, "itm1");
        assert_eq!(records[0].top_reviews, NO_REVIEWS_FOUND);
    }
}
