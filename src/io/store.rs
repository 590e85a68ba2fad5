use crate::types::{DateRange, GreenscanError, GreenscanResult, Product};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for normalized product records
pub trait MetadataSink {
    /// Append one row to `schema.table`. Rows are never replaced.
    fn append_row(&self, schema: &str, table: &str, product: &Product) -> GreenscanResult<()>;
}

impl<S: MetadataSink + ?Sized> MetadataSink for &S {
    fn append_row(&self, schema: &str, table: &str, product: &Product) -> GreenscanResult<()> {
        (**self).append_row(schema, table, product)
    }
}

fn persistence<'a, E: std::fmt::Display>(
    context: &str,
    path: &'a Path,
) -> impl FnOnce(E) -> GreenscanError + 'a {
    let context = context.to_string();
    move |e| GreenscanError::Persistence(format!("{} {}: {}", context, path.display(), e))
}

/// Append-only table files, one JSON object per line, at `<root>/<schema>.<table>.jsonl`
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    root: PathBuf,
    schema: String,
    table: String,
}

impl JsonLinesStore {
    pub fn new(root: impl Into<PathBuf>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn table_path(&self, schema: &str, table: &str) -> PathBuf {
        self.root.join(format!("{}.{}.jsonl", schema, table))
    }

    /// Every row of the configured table, in insertion order
    pub fn load(&self) -> GreenscanResult<Vec<Product>> {
        let path = self.table_path(&self.schema, &self.table);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).map_err(persistence("Cannot open", &path))?;
        let mut rows = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(persistence("Cannot read", &path))?;
            if line.trim().is_empty() {
                continue;
            }
            let product: Product = serde_json::from_str(&line).map_err(|e| {
                GreenscanError::Persistence(format!(
                    "Corrupt row {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                ))
            })?;
            rows.push(product);
        }
        Ok(rows)
    }

    /// Most recently appended row with this id
    pub fn find_by_id(&self, id: &str) -> GreenscanResult<Option<Product>> {
        Ok(self.load()?.into_iter().rev().find(|p| p.id == id))
    }

    /// Rows whose acquisition date falls in the range, both ends included
    pub fn search_by_date(&self, range: &DateRange) -> GreenscanResult<Vec<Product>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|p| range.contains(p.acquisition_date.date_naive()))
            .collect())
    }
}

impl MetadataSink for JsonLinesStore {
    fn append_row(&self, schema: &str, table: &str, product: &Product) -> GreenscanResult<()> {
        fs::create_dir_all(&self.root).map_err(persistence("Cannot create", &self.root))?;
        let path = self.table_path(schema, table);

        let mut line = serde_json::to_string(product)
            .map_err(|e| GreenscanError::Persistence(format!("Cannot encode {}: {}", product.id, e)))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(persistence("Cannot open", &path))?;
        file.write_all(line.as_bytes())
            .map_err(persistence("Cannot write", &path))?;
        file.sync_all().map_err(persistence("Cannot sync", &path))?;

        log::debug!("Appended {} to {}", product.id, path.display());
        Ok(())
    }
}

/// In-memory sink, handy when nothing should touch disk
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<(String, String, Product)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<(String, String, Product)> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl MetadataSink for MemorySink {
    fn append_row(&self, schema: &str, table: &str, product: &Product) -> GreenscanResult<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| GreenscanError::Persistence("memory sink poisoned".to_string()))?;
        rows.push((schema.to_string(), table.to_string(), product.clone()));
        Ok(())
    }
}
