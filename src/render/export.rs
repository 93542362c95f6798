use super::error::RenderError;
use crate::browser::{PageFormat, RenderSession};
use std::time::Duration;

/// Every PDF starts with this header.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Prints the session's page with the fixed A4 layout.
///
/// There is no per-call formatting: both captured templates print the same
/// way. A failed print is reported once and never retried.
#[derive(Debug, Clone)]
pub struct DocumentExporter {
    format: PageFormat,
    timeout: Duration,
}

impl Default for DocumentExporter {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl DocumentExporter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            format: PageFormat::A4,
            timeout,
        }
    }

    pub fn format(&self) -> PageFormat {
        self.format
    }

    pub async fn export(&self, session: &RenderSession) -> Result<Vec<u8>, RenderError> {
        let page = session
            .page()
            .map_err(|e| RenderError::Export(e.to_string()))?;

        let bytes = tokio::time::timeout(self.timeout, page.print_pdf(self.format))
            .await
            .map_err(|_| {
                RenderError::Export(format!(
                    "print did not finish within {}s",
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| RenderError::Export(e.to_string()))?;

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(RenderError::Export(format!(
                "engine returned {} bytes that are not a PDF document",
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_is_fixed_to_a4() {
        let exporter = DocumentExporter::default();
        assert_eq!(exporter.format(), PageFormat::A4);
    }
}
