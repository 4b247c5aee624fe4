mod common;

use betty_chat::models::wire::FormattedDoc;
use betty_chat::services::mock::{MockChatGateway, MockOperation};
use betty_chat::{DocumentAttachment, DocumentExporter, DocumentFormat, ExportProgress};
use betty_core::error::{ErrorKind, GatewayError};
use std::sync::Arc;
use tokio::sync::broadcast;

fn exporter() -> (Arc<MockChatGateway>, DocumentExporter) {
    common::init_tracing();
    let gateway = Arc::new(MockChatGateway::new());
    let exporter = DocumentExporter::new(gateway.clone());
    (gateway, exporter)
}

#[tokio::test]
async fn export_reports_formatting_while_in_flight() {
    let (gateway, exporter) = exporter();
    let gate = gateway.hold_next(MockOperation::CreateFormattedDoc).await;

    let exporting = exporter.export("Mutual NDA", "# Mutual NDA", DocumentFormat::Markdown);
    let observe = async {
        let mut progress = exporter.progress();
        let seen = progress
            .wait_for(|p| p.progress == 75)
            .await
            .expect("Exporter dropped")
            .clone();
        gate.send(()).expect("Export was not parked");
        seen
    };

    let (result, in_flight) = tokio::join!(exporting, observe);

    assert!(in_flight.is_exporting);
    assert_eq!(in_flight.message, "Formatting in Google Docs");

    let doc = result.expect("Export failed");
    assert_eq!(doc.document_id, "gdoc-1");
    assert!(doc.markdown_converted);

    let requests = gateway.exported_requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].preserve_markdown);
}

fn drain(checkpoints: &mut broadcast::Receiver<ExportProgress>) -> Vec<(u8, bool)> {
    let mut seen = Vec::new();
    while let Ok(step) = checkpoints.try_recv() {
        seen.push((step.progress, step.is_exporting));
    }
    seen
}

#[tokio::test]
async fn every_checkpoint_is_delivered_in_order() {
    let (_gateway, exporter) = exporter();
    let mut checkpoints = exporter.checkpoints();

    exporter
        .export("T", "body", DocumentFormat::Markdown)
        .await
        .expect("Export failed");

    assert_eq!(
        drain(&mut checkpoints),
        vec![(0, true), (25, true), (75, true), (100, true), (0, false)]
    );
}

#[tokio::test]
async fn failed_export_stops_before_ready_then_resets() {
    let (gateway, exporter) = exporter();
    gateway
        .push_formatted_doc(Err(GatewayError::Network("offline".into())))
        .await;
    let mut checkpoints = exporter.checkpoints();

    exporter
        .export("T", "body", DocumentFormat::Markdown)
        .await
        .expect_err("Export should fail");

    assert_eq!(
        drain(&mut checkpoints),
        vec![(0, true), (25, true), (75, true), (0, false)]
    );
}

#[tokio::test]
async fn checkpoint_messages_describe_each_step() {
    let (_gateway, exporter) = exporter();
    let mut checkpoints = exporter.checkpoints();

    exporter
        .export("T", "body", DocumentFormat::Text)
        .await
        .expect("Export failed");

    let mut messages = Vec::new();
    while let Ok(step) = checkpoints.try_recv() {
        messages.push(step.message);
    }
    assert_eq!(
        messages,
        vec![
            "Starting export",
            "Preparing document",
            "Formatting in Google Docs",
            "Document ready",
            "",
        ]
    );
}

#[tokio::test]
async fn progress_resets_after_success() {
    let (_gateway, exporter) = exporter();

    exporter
        .export("Notes", "plain text", DocumentFormat::Text)
        .await
        .expect("Export failed");

    assert_eq!(*exporter.progress().borrow(), ExportProgress::default());
    assert!(!exporter.is_exporting());
}

#[tokio::test]
async fn progress_resets_after_failure() {
    let (gateway, exporter) = exporter();
    gateway
        .push_formatted_doc(Err(GatewayError::Unauthorized(
            "Google account not linked".into(),
        )))
        .await;

    let err = exporter
        .export("Mutual NDA", "# Mutual NDA", DocumentFormat::Markdown)
        .await
        .expect_err("Export should fail");

    assert_eq!(err.kind(), ErrorKind::Auth);
    let progress = exporter.progress().borrow().clone();
    assert!(!progress.is_exporting);
    assert_eq!(progress.progress, 0);
}

#[tokio::test]
async fn concurrent_export_is_rejected() {
    let (gateway, exporter) = exporter();
    let gate = gateway.hold_next(MockOperation::CreateFormattedDoc).await;

    let first = exporter.export("One", "first", DocumentFormat::Text);
    let second = async {
        let mut progress = exporter.progress();
        progress
            .wait_for(|p| p.is_exporting)
            .await
            .expect("Exporter dropped");
        let result = exporter.export("Two", "second", DocumentFormat::Text).await;
        gate.send(()).expect("Export was not parked");
        result
    };

    let (first, second) = tokio::join!(first, second);

    first.expect("First export failed");
    let err = second.expect_err("Second export should be rejected");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(gateway.calls(MockOperation::CreateFormattedDoc).await, 1);
}

#[tokio::test]
async fn invalid_input_never_reaches_gateway() {
    let (gateway, exporter) = exporter();

    let empty_title = exporter
        .export("", "content", DocumentFormat::Markdown)
        .await
        .expect_err("Empty title should be rejected");
    let empty_body = exporter
        .export("Title", "", DocumentFormat::Markdown)
        .await
        .expect_err("Empty content should be rejected");

    assert_eq!(empty_title.kind(), ErrorKind::Validation);
    assert_eq!(empty_body.kind(), ErrorKind::Validation);
    assert_eq!(gateway.calls(MockOperation::CreateFormattedDoc).await, 0);
    assert!(!exporter.is_exporting());
}

#[tokio::test]
async fn export_attachment_uses_document_fields() {
    let (gateway, exporter) = exporter();
    gateway
        .push_formatted_doc(Ok(FormattedDoc {
            document_id: "g7".into(),
            document_url: "https://docs.google.com/document/d/g7/edit".into(),
            formatted: true,
            markdown_converted: false,
        }))
        .await;

    let attachment = DocumentAttachment {
        title: "Meeting notes".into(),
        content: "Attendees: ...".into(),
        format: DocumentFormat::Text,
        document_id: None,
    };
    let doc = exporter
        .export_attachment(&attachment)
        .await
        .expect("Export failed");

    assert_eq!(doc.document_id, "g7");
    let request = &gateway.exported_requests().await[0];
    assert_eq!(request.title, "Meeting notes");
    assert_eq!(request.format, DocumentFormat::Text);
    assert!(!request.preserve_markdown);
}
