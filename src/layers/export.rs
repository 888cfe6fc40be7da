use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

use crate::layers::api::BackendClient;
use crate::layers::collections::CollectionItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Bibtex,
    Ris,
}

impl ExportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Bibtex => "references.bib",
            ExportFormat::Ris => "references.ris",
        }
    }
}

/// Literature record the backend formatter understands, built from a saved item.
pub fn reference_from_item(item: &CollectionItem) -> Value {
    let doi = item.paper_id.starts_with("10.").then(|| item.paper_id.clone());
    json!({
        "title": item.title,
        "authors": item.authors.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>(),
        "abstract": (!item.abstract_text.is_empty()).then(|| item.abstract_text.clone()),
        "doi": doi,
        "url": item.url,
        "citation_count": item.citation_count,
        "source": item.source,
    })
}

pub struct ReferenceExporter {
    client: BackendClient,
    out_dir: PathBuf,
}

impl ReferenceExporter {
    pub fn new(client: BackendClient, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            out_dir: out_dir.into(),
        }
    }

    pub async fn format_one(&self, item: &CollectionItem, style: &str) -> Result<String> {
        let formatted = self
            .client
            .format_reference(&reference_from_item(item), style)
            .await?;
        Ok(formatted.formatted_reference)
    }

    /// Has the backend render `items` and writes the result into the output directory.
    pub async fn export(&self, items: &[CollectionItem], format: ExportFormat) -> Result<PathBuf> {
        if items.is_empty() {
            return Err(anyhow!("No references to export."));
        }

        let refs: Vec<Value> = items.iter().map(reference_from_item).collect();
        let bytes = match format {
            ExportFormat::Bibtex => self.client.export_bibtex(&refs).await?,
            ExportFormat::Ris => self.client.export_ris(&refs).await?,
        };

        create_dir_all(&self.out_dir).await?;
        let path = self.out_dir.join(format.file_name());
        tracing::info!("Writing {} references to {:?}", items.len(), path);
        let mut file = File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(path)
    }
}
