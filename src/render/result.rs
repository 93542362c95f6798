use super::request::RenderTarget;
use chrono::NaiveDate;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A finished capture
#[derive(Debug, Clone)]
pub struct RenderResult {
    bytes: Vec<u8>,
    suggested_filename: String,
}

impl RenderResult {
    pub fn new(bytes: Vec<u8>, target: RenderTarget, date: NaiveDate) -> Self {
        Self {
            bytes,
            suggested_filename: suggested_filename(target, date),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn media_type(&self) -> &'static str {
        PDF_MEDIA_TYPE
    }

    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }
}

/// `<kind>-[id-]<YYYY-MM-DD>.pdf`
pub fn suggested_filename(target: RenderTarget, date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    match target.id() {
        Some(id) => format!("{}-{}-{}.pdf", target.kind(), id, date),
        None => format!("{}-{}.pdf", target.kind(), date),
    }
}
