use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tasklist::api::TaskBackend as _;
use tasklist::api::http::HttpBackend;
use tasklist::config::ServerConfig;
use tasklist::core::controller::{DeleteOutcome, TaskListController};
use tasklist::error::TasklistError;
use tasklist::task::model::{RecordId, TaskStatus};

const TASKS: &str = "/api/todos.php";
const SESSION: &str = "/api/auth.php";
const USERS: &str = "/api/users.php";

fn backend(server: &ServerGuard) -> HttpBackend {
    let cfg = ServerConfig {
        base_url: format!("{}/", server.url()),
        timeout_secs: 5,
        ..ServerConfig::default()
    };
    HttpBackend::new(&cfg).unwrap()
}

async fn mock_json(server: &mut ServerGuard, method: &str, path: &str, body: serde_json::Value) -> mockito::Mock {
    server
        .mock(method, path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

async fn loaded(server: &mut ServerGuard) -> TaskListController<HttpBackend> {
    // Mocks are removed when dropped.
    let _tasks = mock_json(
        server,
        "GET",
        TASKS,
        json!([
            {"id": 1, "description": "a", "assigned": null, "status": "WAITING",
             "createdAt": {"date": "2024-03-01 09:15:00.000000", "timezone_type": 3, "timezone": "Europe/Paris"},
             "startedAt": null, "completedAt": null},
            {"id": 2, "description": "b", "assigned": {"id": 7, "username": "bob", "rank": "USER"},
             "status": "IN_PROGRESS", "createdAt": null, "startedAt": null, "completedAt": null}
        ]),
    )
    .await;
    let _session = mock_json(server, "GET", SESSION, json!({"id": 1, "username": "admin", "rank": "ADMIN"})).await;
    let _users = mock_json(
        server,
        "GET",
        USERS,
        json!([{"id": 1, "username": "admin", "rank": "ADMIN"}, {"id": 7, "username": "bob", "rank": "USER"}]),
    )
    .await;

    let mut ctl = TaskListController::new(backend(server));
    ctl.load_all().await.unwrap();
    ctl
}

#[tokio::test]
async fn load_all_fills_tasks_users_and_session() {
    let mut server = Server::new_async().await;
    let ctl = loaded(&mut server).await;

    let state = ctl.state();
    assert_eq!(state.tasks().len(), 2);
    assert_eq!(state.users().len(), 2);
    assert!(state.is_admin());
    let b = state.task(&RecordId::Int(2)).unwrap();
    assert_eq!(b.assignee_name(), Some("bob"));
    assert_eq!(b.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn status_change_posts_batch_and_merges_reply() {
    let mut server = Server::new_async().await;
    let mut ctl = loaded(&mut server).await;

    let save = server
        .mock("POST", TASKS)
        .match_body(Matcher::Json(json!({"todos": [{
            "id": 1,
            "description": "a",
            "assigned": null,
            "status": "COMPLETED",
            "createdAt": {"date": "2024-03-01 09:15:00.000000", "timezone_type": 3, "timezone": "Europe/Paris"},
            "startedAt": null,
            "completedAt": null
        }]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{"id": 1, "status": "COMPLETED",
                    "completedAt": {"date": "2024-03-02 10:00:00.000000", "timezone_type": 3, "timezone": "Europe/Paris"}}])
            .to_string(),
        )
        .create_async()
        .await;

    ctl.state_mut().select_only(&[RecordId::Int(1)]);
    let n = ctl.change_status(TaskStatus::Completed).await.unwrap();
    save.assert_async().await;

    assert_eq!(n, 1);
    let a = ctl.state().task(&RecordId::Int(1)).unwrap();
    assert_eq!(a.status, TaskStatus::Completed);
    assert_eq!(a.description, "a");
    assert!(a.completed_at.is_some());
    assert!(a.selected, "selection survives a save");
}

#[tokio::test]
async fn new_task_is_appended_with_server_id() {
    let mut server = Server::new_async().await;
    let mut ctl = loaded(&mut server).await;

    let _save = server
        .mock("POST", TASKS)
        .match_body(Matcher::PartialJson(json!({"todos": [{"description": "c", "status": "WAITING"}]})))
        .with_status(200)
        .with_body(json!([{"id": 3, "description": "c", "status": "WAITING", "assigned": null}]).to_string())
        .create_async()
        .await;

    ctl.state_mut().open_editor(None);
    ctl.state_mut().editor_mut().unwrap().description = "c".to_owned();
    ctl.save_editor().await.unwrap();

    assert!(ctl.state().editor().is_none());
    assert_eq!(ctl.state().tasks().len(), 3);
    assert_eq!(ctl.state().tasks()[2].id, Some(RecordId::Int(3)));
}

#[tokio::test]
async fn empty_save_sends_nothing() {
    let mut server = Server::new_async().await;
    let mut ctl = loaded(&mut server).await;

    let save = server.mock("POST", TASKS).expect(0).create_async().await;
    assert_eq!(ctl.save(Vec::new()).await.unwrap(), 0);
    assert_eq!(ctl.save_selected().await.unwrap(), 0);
    save.assert_async().await;
}

#[tokio::test]
async fn delete_removes_confirmed_tasks() {
    let mut server = Server::new_async().await;
    let mut ctl = loaded(&mut server).await;

    let delete = server
        .mock("DELETE", TASKS)
        .match_body(Matcher::PartialJson(json!({"todos": [{"id": 2}]})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let target = ctl.state().task(&RecordId::Int(2)).cloned().unwrap();
    let outcome = ctl.delete_tasks(Some(vec![target]), |_| true).await.unwrap();
    delete.assert_async().await;

    assert_eq!(outcome, DeleteOutcome::Deleted(1));
    assert!(ctl.state().task(&RecordId::Int(2)).is_none());
    assert_eq!(ctl.state().tasks().len(), 1);
}

#[tokio::test]
async fn rejected_request_is_a_status_error() {
    let mut server = Server::new_async().await;
    let _tasks = server.mock("GET", TASKS).with_status(500).create_async().await;

    let err = backend(&server).fetch_tasks().await.unwrap_err();
    assert!(matches!(err, TasklistError::Status { status: 500, .. }), "{err:?}");
    assert!(err.is_transport());
}

#[tokio::test]
async fn malformed_save_reply_is_a_protocol_error_and_keeps_state() {
    let mut server = Server::new_async().await;
    let mut ctl = loaded(&mut server).await;

    let _save = server
        .mock("POST", TASKS)
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await;

    let mut edited = ctl.state().task(&RecordId::Int(1)).cloned().unwrap();
    ctl.state_mut().open_editor(Some(&edited));
    edited.description = "changed".to_owned();
    let err = ctl.save(vec![edited]).await.unwrap_err();

    assert!(err.is_protocol(), "{err:?}");
    assert_eq!(ctl.state().task(&RecordId::Int(1)).unwrap().description, "a");
    assert!(ctl.state().editor().is_some(), "editor stays open on failure");
}

#[tokio::test]
async fn signed_out_session_is_none() {
    let mut server = Server::new_async().await;
    let _session = mock_json(&mut server, "GET", SESSION, json!(null)).await;

    assert!(backend(&server).fetch_session().await.unwrap().is_none());
}
