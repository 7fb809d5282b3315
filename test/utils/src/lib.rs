use std::env;

use serde_json::json;

pub fn insta_snapshot<F: FnOnce()>(f: F) {
    let mut settings = insta::Settings::clone_current();
    let snapshot_path = env::current_dir().unwrap().join("./test/snapshots");
    settings.set_snapshot_path(snapshot_path);
    settings.bind(f);
}

pub fn ingest_status_fixture(status: &str, step: &str, logs: &[&str]) -> String {
    return json!({
        "status": status,
        "step": step,
        "logs": logs,
        "error": null,
    })
    .to_string();
}

pub fn failed_status_fixture(error: &str) -> String {
    return json!({
        "status": "failed",
        "step": "Error",
        "logs": ["Request received.", "Cloning repository..."],
        "error": error,
    })
    .to_string();
}

pub fn project_rows_fixture(id: &str, user_id: &str, repo_url: &str) -> String {
    return json!([{
        "id": id,
        "user_id": user_id,
        "repo_url": repo_url,
        "last_commit": "9f2c1e4b7a0d",
    }])
    .to_string();
}

pub fn auth_session_fixture(user_id: &str, access_token: &str, expires_at: i64) -> String {
    return json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": expires_at,
        "refresh_token": "refresh-token",
        "user": {
            "id": user_id,
            "email": "dev@lumis.dev",
        },
    })
    .to_string();
}
