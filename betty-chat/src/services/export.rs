//! Export of a generated document to Google Docs with coarse progress.

use betty_core::error::GatewayError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use validator::Validate;

use crate::models::message::{DocumentAttachment, DocumentFormat};
use crate::models::wire::{FormattedDoc, FormattedDocRequest};
use crate::services::gateway::ChatGateway;

pub type ExportedDocument = FormattedDoc;

const STARTING: (u8, &str) = (0, "Starting export");
const PREPARING: (u8, &str) = (25, "Preparing document");
const FORMATTING: (u8, &str) = (75, "Formatting in Google Docs");
const READY: (u8, &str) = (100, "Document ready");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    pub is_exporting: bool,
    /// Percentage, one of 0, 25, 75, 100.
    pub progress: u8,
    pub message: String,
}

impl ExportProgress {
    fn at((progress, message): (u8, &str)) -> Self {
        Self {
            is_exporting: true,
            progress,
            message: message.to_string(),
        }
    }
}

/// Checkpoints buffered per `checkpoints()` subscriber.
const CHECKPOINT_BUFFER: usize = 16;

/// Puts progress back to idle however the export ends, including when the
/// export future is dropped mid-flight.
struct ResetOnDrop<'a> {
    exporter: &'a DocumentExporter,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.exporter.publish(ExportProgress::default());
    }
}

/// Exports documents and reports progress two ways: `progress()` holds the
/// latest state, `checkpoints()` delivers every transition in order.
pub struct DocumentExporter {
    gateway: Arc<dyn ChatGateway>,
    progress: watch::Sender<ExportProgress>,
    checkpoints: broadcast::Sender<ExportProgress>,
}

impl DocumentExporter {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        let (progress, _) = watch::channel(ExportProgress::default());
        let (checkpoints, _) = broadcast::channel(CHECKPOINT_BUFFER);
        Self {
            gateway,
            progress,
            checkpoints,
        }
    }

    pub fn progress(&self) -> watch::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    /// Every checkpoint published after subscribing, ending with the idle
    /// reset.
    pub fn checkpoints(&self) -> broadcast::Receiver<ExportProgress> {
        self.checkpoints.subscribe()
    }

    pub fn is_exporting(&self) -> bool {
        self.progress.borrow().is_exporting
    }

    fn publish(&self, progress: ExportProgress) {
        self.progress.send_replace(progress.clone());
        // No subscribers is fine.
        let _ = self.checkpoints.send(progress);
    }

    /// Export an attachment received in a chat reply.
    pub async fn export_attachment(
        &self,
        attachment: &DocumentAttachment,
    ) -> Result<ExportedDocument, GatewayError> {
        self.export(&attachment.title, &attachment.content, attachment.format)
            .await
    }

    pub async fn export(
        &self,
        title: &str,
        content: &str,
        format: DocumentFormat,
    ) -> Result<ExportedDocument, GatewayError> {
        let request = FormattedDocRequest::new(title, content, format);
        request.validate()?;

        let claimed = self.progress.send_if_modified(|p| {
            if p.is_exporting {
                return false;
            }
            *p = ExportProgress::at(STARTING);
            true
        });
        if !claimed {
            tracing::warn!(title, "Export rejected, another export is running");
            return Err(GatewayError::Validation(
                "an export is already in progress".to_string(),
            ));
        }
        let _ = self.checkpoints.send(ExportProgress::at(STARTING));
        let _reset = ResetOnDrop { exporter: self };

        tracing::info!(title, format = format.as_str(), "Exporting document");
        self.publish(ExportProgress::at(PREPARING));
        self.publish(ExportProgress::at(FORMATTING));

        match self.gateway.create_formatted_doc(&request).await {
            Ok(doc) => {
                self.publish(ExportProgress::at(READY));
                tracing::info!(
                    document_id = %doc.document_id,
                    markdown_converted = doc.markdown_converted,
                    "Document exported"
                );
                Ok(doc)
            }
            Err(err) => {
                tracing::error!(title, kind = %err.kind(), error = %err, "Export failed");
                Err(err)
            }
        }
    }
}
