mod common;

use assistant_client::models::{
    CloseReason, MessageAction, RealtimeMessage, SessionState, TaskId, TransferStatus,
};
use assistant_client::startup::{Application, Collaborators};
use assistant_client::transfers::FileSubmission;
use chrono::Utc;
use client_core::ClientError;
use common::{
    file_response, make_token, next_server, test_settings, valid_credential, wait_until,
    MockChatApi, MockConnector, MockDocumentApi, ServerHandle,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

struct TestApp {
    app: Application,
    connector: Arc<MockConnector>,
    servers: mpsc::UnboundedReceiver<ServerHandle>,
    documents: Arc<MockDocumentApi>,
    chat: Arc<MockChatApi>,
}

impl TestApp {
    fn build(credential: assistant_client::auth::Credential) -> Self {
        let (connector, servers) = MockConnector::accepting();
        let documents = MockDocumentApi::auto();
        let chat = MockChatApi::new();

        let app = Application::build_with(
            test_settings("http://127.0.0.1:8000"),
            credential,
            Collaborators {
                connector: connector.clone(),
                documents: documents.clone(),
                chat: chat.clone(),
            },
        );

        TestApp {
            app,
            connector,
            servers,
            documents,
            chat,
        }
    }
}

#[tokio::test]
async fn start_connects_and_chat_round_trips() {
    let mut test = TestApp::build(valid_credential());
    test.app.start().await.unwrap();
    let server = next_server(&mut test.servers).await;
    let store = test.app.store().clone();
    wait_until(&store, |s| s.session().state == SessionState::Connected).await;

    let seq = test.app.send_message("Summarise the Q3 report").await.unwrap();
    server.push_text(r#"{"role":"assistant","content":"Revenue grew.","ragContext":[]}"#);
    wait_until(&store, |s| s.messages().len() == 2).await;

    let messages = store.messages();
    assert_eq!(messages[0].0, seq);
    assert_eq!(messages[1].1.content, "Revenue grew.");
    assert!(messages[1].1.retrieval_context.is_none());

    test.app.shutdown().await;
    assert_eq!(test.app.session().state(), SessionState::Disconnected);
}

#[tokio::test]
async fn apply_action_appends_derived_message() {
    let test = TestApp::build(valid_credential());
    let store = test.app.store();
    let source = store.append_message(
        RealtimeMessage::assistant("A long and winding answer.").with_model(Some("llama3".to_string())),
    );

    let seq = test
        .app
        .apply_action(MessageAction::Humanize, source)
        .await
        .unwrap();

    let derived = store.message(seq).unwrap();
    assert_eq!(derived.content, "humanize: A long and winding answer.");
    assert_eq!(
        derived.original_content.as_deref(),
        Some("A long and winding answer.")
    );
    let link = derived.derived_from.unwrap();
    assert_eq!(link.action, MessageAction::Humanize);
    assert_eq!(link.source_message, source);

    // The source message's model is reused
    let requests = test.chat.requests.lock().unwrap().clone();
    assert_eq!(requests[0].2, "llama3");

    // The source is untouched
    assert_eq!(store.message(source).unwrap().content, "A long and winding answer.");
}

#[tokio::test]
async fn apply_action_on_unknown_message_fails() {
    let test = TestApp::build(valid_credential());

    let result = test.app.apply_action(MessageAction::Summarize, 42).await;

    assert!(matches!(result, Err(ClientError::MessageNotFound(42))));
    assert!(test.chat.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clear_history_removes_local_messages() {
    let test = TestApp::build(valid_credential());
    test.app
        .store()
        .append_message(RealtimeMessage::user("one", None));
    test.app
        .store()
        .append_message(RealtimeMessage::assistant("two"));

    let removed = test.app.clear_history().await.unwrap();

    assert_eq!(removed, 2);
    assert!(test.app.store().messages().is_empty());
    assert_eq!(test.chat.cleared.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_remote_files_adds_unknown_files_once() {
    let test = TestApp::build(valid_credential());
    test.documents.set_remote_files(vec![
        file_response("srv-1", "contract.pdf", 4096),
        file_response("srv-2", "budget.xlsx", 1024),
    ]);

    assert_eq!(test.app.sync_remote_files().await.unwrap(), 2);
    assert_eq!(test.app.sync_remote_files().await.unwrap(), 0);

    let task = test.app.store().task(&TaskId::canonical("srv-1")).unwrap();
    assert_eq!(task.status, TransferStatus::Processed);
    assert_eq!(test.documents.list_calls(), 2);
}

#[tokio::test]
async fn task_status_asks_the_server_for_known_files() {
    let test = TestApp::build(valid_credential());
    test.documents
        .set_remote_files(vec![file_response("srv-1", "contract.pdf", 4096)]);
    test.app.sync_remote_files().await.unwrap();

    let status = test
        .app
        .task_status(&TaskId::canonical("srv-1"))
        .await
        .unwrap();

    assert_eq!(status.file_id, "srv-1");
    assert_eq!(status.status, "processed");
    assert!(matches!(
        test.app.task_status(&TaskId::canonical("srv-9")).await,
        Err(ClientError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn task_status_refuses_tasks_not_yet_uploaded() {
    let test = TestApp::build(valid_credential());
    let local = test
        .app
        .submit(FileSubmission::new("draft.pdf", "application/pdf", vec![0; 64]))
        .unwrap();

    assert!(matches!(
        test.app.task_status(&local).await,
        Err(ClientError::InvalidTransition(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn submitted_file_is_processed_with_tags() {
    let test = TestApp::build(valid_credential());
    test.documents
        .set_tags(&common::file_id_for("minutes.pdf"), &["meeting"]);

    let local = test
        .app
        .submit(FileSubmission::new(
            "minutes.pdf",
            "application/pdf",
            vec![0; 2048],
        ))
        .unwrap();

    let store = test.app.store().clone();
    let id = TaskId::canonical(common::file_id_for("minutes.pdf"));
    wait_until(&store, |s| {
        s.task(&id)
            .map(|t| t.status == TransferStatus::Processed)
            .unwrap_or(false)
    })
    .await;

    assert!(store.task(&local).is_none());
    assert_eq!(store.task(&id).unwrap().tags, vec!["meeting".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn credential_expiry_logs_out() {
    let credential =
        assistant_client::auth::Credential::new(make_token(Utc::now().timestamp() + 5));
    let mut test = TestApp::build(credential);
    let mut logged_out = test.app.logged_out();

    test.app.start().await.unwrap();
    let _server = next_server(&mut test.servers).await;

    tokio::time::timeout(common::WAIT_LIMIT, logged_out.changed())
        .await
        .expect("No logout in time")
        .unwrap();
    assert_eq!(*logged_out.borrow(), Some(CloseReason::Expired));
    assert_eq!(test.app.session().state(), SessionState::Disconnected);
    assert!(test.app.session().snapshot().requires_reauth);
    assert_eq!(test.connector.connects(), 1);
}

#[tokio::test]
async fn explicit_logout_closes_without_reconnect() {
    let mut test = TestApp::build(valid_credential());
    test.app.start().await.unwrap();
    let _server = next_server(&mut test.servers).await;

    test.app.logout().await.unwrap();

    let snapshot = test.app.session().snapshot();
    assert_eq!(snapshot.state, SessionState::Disconnected);
    assert_eq!(snapshot.last_close_reason, Some(CloseReason::UserLogout));
    assert!(test.app.logged_out().borrow().is_none());
    assert!(matches!(
        test.app.send_message("hello?").await,
        Err(ClientError::NotConnected)
    ));
}
