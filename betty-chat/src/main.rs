use anyhow::Context;
use betty_chat::{
    await_google_link, ChatGateway, ConversationHandle, DocumentExporter, HttpChatGateway,
    LinkError, LinkPolicy, Message, Role, SendFailure, SendOutcome, SessionController,
};
use betty_core::auth::{forget_rejected_token, MemoryTokenStore, TokenStore};
use betty_core::config::Settings;
use betty_core::error::ErrorKind;
use betty_core::observability::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;

const STATUS_INTERVAL: Duration = Duration::from_millis(1500);

const HELP: &str = "\
Commands:
  /new        start a new chat
  /retry      resend the last failed message
  /dismiss    hide the connection error
  /delete     delete this conversation and start over
  /export     export the last generated document to Google Docs
  /google     wait until your Google account is linked
  /stats      show chat statistics
  /quit       exit";

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "betty",
        Role::System => "system",
    };
    println!("[{}] {}", who, message.content);
    if let Some(doc) = &message.document {
        println!(
            "  document: {} ({} chars, {})",
            doc.title,
            doc.content.len(),
            doc.format.as_str()
        );
    }
}

/// Print the banner for a failed call. Returns `true` if the user has to
/// sign in again.
async fn report_error(tokens: &dyn TokenStore, kind: ErrorKind) -> bool {
    println!("! {}", kind.user_message());
    if forget_rejected_token(tokens, kind).await {
        println!("  Sign in again, then restart with BETTY__AUTH__TOKEN set.");
        return true;
    }
    false
}

fn last_document(controller: &SessionController) -> Option<Message> {
    controller
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.is_document())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing("betty-chat", &settings.log.level, settings.log.format);

    let tokens = Arc::new(MemoryTokenStore::new());
    match settings.auth.token.clone() {
        Some(token) => tokens.set_token(token).await,
        None => tracing::warn!("No access token configured, set BETTY__AUTH__TOKEN"),
    }

    let gateway: Arc<dyn ChatGateway> = Arc::new(
        HttpChatGateway::new(
            &settings.api,
            settings.retry.to_retry_config(),
            tokens.clone(),
        )
        .context("failed to build gateway")?,
    );

    let handle = match std::env::args().nth(1) {
        Some(id) => ConversationHandle::Existing(id),
        None => ConversationHandle::New,
    };
    let controller = SessionController::new(gateway.clone(), handle)
        .with_send_timeout(settings.api.request_timeout());
    let exporter = DocumentExporter::new(gateway.clone());
    let link_policy = LinkPolicy::from(&settings.google_link);

    tracing::info!(base_url = %settings.api.base_url, "Betty console started");

    if let Err(e) = controller.load_history().await {
        report_error(tokens.as_ref(), e.kind()).await;
    }
    for message in controller.messages() {
        print_message(&message);
    }
    println!("{}", HELP);

    let mut last_failure: Option<SendFailure> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let result = match line.trim() {
            "/quit" => break,
            "/new" => {
                controller.start_new();
                last_failure = None;
                println!("Started a new chat.");
                continue;
            }
            "/dismiss" => {
                controller.dismiss_error();
                continue;
            }
            "/delete" => {
                match controller.delete_conversation().await {
                    Ok(_) => println!("Conversation deleted."),
                    Err(e) => {
                        report_error(tokens.as_ref(), e.kind()).await;
                    }
                }
                continue;
            }
            "/stats" => {
                match gateway.chat_stats().await {
                    Ok(stats) => println!(
                        "{} conversations, {} messages ({} today), {} documents, {} tasks, {:.1}s avg",
                        stats.total_conversations,
                        stats.total_messages,
                        stats.messages_today,
                        stats.documents_created,
                        stats.tasks_created,
                        stats.average_response_time.unwrap_or(0.0)
                    ),
                    Err(e) => {
                        report_error(tokens.as_ref(), e.kind()).await;
                    }
                }
                continue;
            }
            "/export" => {
                let Some(doc) = last_document(&controller).and_then(|m| m.document) else {
                    println!("No document in this conversation yet.");
                    continue;
                };
                match exporter.export_attachment(&doc).await {
                    Ok(exported) => println!("Document ready: {}", exported.document_url),
                    Err(e) => {
                        report_error(tokens.as_ref(), e.kind()).await;
                    }
                }
                continue;
            }
            "/google" => {
                let cancel = CancellationToken::new();
                let waiting = await_google_link(gateway.as_ref(), &link_policy, &cancel);
                tokio::select! {
                    result = waiting => match result {
                        Ok(status) => println!(
                            "Google linked{}",
                            status.email.map(|e| format!(" as {}", e)).unwrap_or_default()
                        ),
                        Err(LinkError::Gateway(e)) => {
                            report_error(tokens.as_ref(), e.kind()).await;
                        }
                        Err(e) => println!("! {}", e),
                    },
                    _ = signal::ctrl_c() => cancel.cancel(),
                }
                continue;
            }
            "/retry" => match last_failure.take() {
                Some(failure) => controller.retry(&failure).await,
                None => {
                    println!("Nothing to retry.");
                    continue;
                }
            },
            "" => continue,
            text => {
                let sending = controller.send(text);
                tokio::pin!(sending);
                let mut ticker = tokio::time::interval(STATUS_INTERVAL);
                let mut tick = 0;
                loop {
                    tokio::select! {
                        biased;
                        result = &mut sending => break result,
                        _ = ticker.tick() => {
                            if let Some(status) = controller.status_message(tick) {
                                println!("... {}", status);
                            }
                            tick += 1;
                        }
                    }
                }
            }
        };

        match result {
            Ok(SendOutcome::Delivered(delivery)) => {
                print_message(&delivery.assistant_message);
                if delivery.task_created {
                    println!("  (task added to your planner)");
                }
            }
            Ok(SendOutcome::Skipped(reason)) => tracing::debug!(?reason, "Send skipped"),
            Ok(SendOutcome::Discarded) => {}
            Err(failure) => {
                if report_error(tokens.as_ref(), failure.kind).await {
                    continue;
                }
                println!("  Type /retry to resend.");
                last_failure = Some(failure);
            }
        }
    }

    controller.close();
    tracing::info!("Betty console stopped");
    Ok(())
}
