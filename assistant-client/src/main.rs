use anyhow::Context;
use assistant_client::auth::Credential;
use assistant_client::commands::ConsoleCommand;
use assistant_client::config::Settings;
use assistant_client::models::{Entity, TransferTask};
use assistant_client::startup::Application;
use assistant_client::store::StoreEvent;
use assistant_client::transfers::FileSubmission;
use client_core::ClientError;
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn print_event(event: &StoreEvent) {
    match event {
        StoreEvent::Upserted { id, value } => match value {
            Entity::Message(message) => {
                println!("[{}] {:?}: {}", id, message.role, message.content);
                if let Some(context) = &message.retrieval_context {
                    for item in context {
                        println!(
                            "    source={} score={:.2}",
                            item.source.as_deref().unwrap_or("-"),
                            item.relevance_score
                        );
                    }
                }
            }
            Entity::Task(task) => print_task(task),
            Entity::Session(snapshot) => {
                println!(
                    "session: {:?} attempt={} backoff_ms={}",
                    snapshot.state, snapshot.reconnect_attempt, snapshot.backoff_ms
                );
                if let Some(error) = &snapshot.error {
                    println!("session error: {}", error);
                }
            }
        },
        StoreEvent::Deleted { id } => println!("removed {}", id),
        StoreEvent::Renamed { from, to } => println!("{} is now {}", from, to),
    }
}

fn print_task(task: &TransferTask) {
    let mut line = format!(
        "file {} [{}] {} {}%",
        task.id,
        task.filename,
        task.status.as_str(),
        task.progress_percent
    );
    if let Some(error) = &task.error_message {
        line.push_str(&format!(" error={}", error));
    }
    if !task.tags.is_empty() {
        line.push_str(&format!(" tags={}", task.tags.join(",")));
    }
    println!("{}", line);
}

/// Returns `false` once the user asked to quit.
async fn dispatch(app: &Application, command: ConsoleCommand) -> anyhow::Result<bool> {
    match command {
        ConsoleCommand::Chat(content) => {
            app.send_message(&content).await?;
        }
        ConsoleCommand::Upload(path) => {
            let file = FileSubmission::from_path(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let id = app.submit(file)?;
            println!("queued {}", id);
        }
        ConsoleCommand::Cancel(id) => app.scheduler().cancel(&id)?,
        ConsoleCommand::Retry(id) => app.scheduler().retry(&id)?,
        ConsoleCommand::Delete(id) => app.scheduler().delete(&id).await?,
        ConsoleCommand::Status(id) => {
            let status = app.task_status(&id).await?;
            println!("file {} {}", status.file_id, status.status);
        }
        ConsoleCommand::Action { action, seq } => {
            app.apply_action(action, seq).await?;
        }
        ConsoleCommand::Export(seq) => {
            let exported = app.export_message(seq).await?;
            println!(
                "{} {}",
                exported.message,
                exported.file_path.unwrap_or_default()
            );
        }
        ConsoleCommand::Files => {
            for task in app.scheduler().tasks() {
                print_task(&task);
            }
        }
        ConsoleCommand::Reindex => {
            let result = app.reindex().await?;
            println!("{} {}", result.status, result.message.unwrap_or_default());
        }
        ConsoleCommand::Clear => {
            let removed = app.clear_history().await?;
            println!("cleared {} messages", removed);
        }
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    client_core::observability::init_tracing(
        &settings.common.service_name,
        &settings.common.log_level,
        settings.common.otlp_endpoint.as_deref(),
    )?;

    let token = settings
        .auth
        .token
        .as_ref()
        .map(|token| token.expose_secret().to_string())
        .context("No access token configured (set APP_AUTH__TOKEN)")?;
    let credential = Credential::new(token);

    let app = Application::build(settings, credential);
    let printer = CancellationToken::new();
    app.store().notifier().attach(print_event, &printer);

    app.start().await.context("Failed to open realtime session")?;
    if let Err(e) = app.sync_remote_files().await {
        tracing::warn!(error = %e, "Could not list server files");
    }

    let mut logged_out = app.logged_out();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = logged_out.changed() => {
                if changed.is_err() || logged_out.borrow().is_some() {
                    println!("Session expired, please log in again");
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(command) => match dispatch(&app, command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            println!("error: {:#}", e);
                            let reauth = e
                                .downcast_ref::<ClientError>()
                                .map(ClientError::requires_reauth)
                                .unwrap_or(false);
                            if reauth {
                                println!("Credential rejected, please log in again");
                                break;
                            }
                        }
                    },
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    app.shutdown().await;
    printer.cancel();
    Ok(())
}
