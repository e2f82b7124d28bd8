use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;

use super::store::{DocumentStore, StoreError, StoredDocument};

pub const SPENDING_COLLECTION: &str = "spending";
pub const EXPORT_FILENAME: &str = "spending_data.csv";

/// Document field and header label for each exported column, in output order.
pub const SPENDING_COLUMNS: [(&str, &str); 7] = [
    ("month", "Month"),
    ("fundraising", "Fundraising"),
    ("administration", "Administration"),
    ("programs", "Programs"),
    ("outreach", "Outreach"),
    ("education", "Education"),
    ("emergencyRelief", "Emergency Relief"),
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv buffer: {0}")]
    Buffer(String),
}

/// Read the spending collection and render it as CSV.
pub async fn export_spending(store: &dyn DocumentStore) -> Result<String, ExportError> {
    let documents = store.list(SPENDING_COLLECTION).await?;
    render_spending_csv(&documents)
}

/// Render one quoted row per document under a fixed header.
///
/// Missing or null fields become an empty quoted cell; a record with gaps
/// never blocks the rest of the export.
pub fn render_spending_csv(documents: &[StoredDocument]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(SPENDING_COLUMNS.iter().map(|(_, label)| *label))?;
    for document in documents {
        writer.write_record(
            SPENDING_COLUMNS
                .iter()
                .map(|(field, _)| cell(document.fields.get(*field))),
        )?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Buffer(err.to_string()))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(other) => other.to_string(),
    }
}
