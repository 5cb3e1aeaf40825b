use env_logger::Env;
use log::info;
use serde_json::json;
use sessionstore::session_management::cookie::SetCookieBuffer;
use sessionstore::session_management::session_manager::SessionManager;
use sessionstore::storage::connection::DB_PATH_ENV;
use sessionstore::storage::{DatabaseConnection, DatabaseStorage, FileStorage, TableSchema};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    // Initialize logger (RUST_LOG can override; default to info)
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();

    let out_dir: PathBuf = env::var("SESSION_DEMO_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::current_dir()
                .expect("cwd")
                .join("target")
                .join("session_demo")
        });
    fs::create_dir_all(&out_dir).expect("create output dir");

    let conn = if env::var(DB_PATH_ENV).is_ok() {
        info!("Using DatabaseConnection::new() with {}", DB_PATH_ENV);
        DatabaseConnection::new().expect("open db (env)")
    } else {
        let db_path = out_dir.join("session_demo.sqlite3");
        info!("Using session database at {}", db_path.display());
        DatabaseConnection::new_file(&db_path).expect("open db (file)")
    };
    let conn = Arc::new(conn);
    conn.create_schema(&TableSchema::default()).expect("create table");
    let storage = Arc::new(DatabaseStorage::new(conn));

    // First request: log in and leave a flash message
    let cookies = Arc::new(SetCookieBuffer::new());
    let mut session = SessionManager::with_handler(storage.clone());
    session.set_cookie_transport(cookies.clone());
    session.set("user", json!({"id": 7, "name": "demo"})).expect("set");
    session.flash("notice", Some(json!("Welcome back"))).expect("flash");
    session.regenerate_id(true).expect("regenerate");
    let id = session.get_id().expect("id").to_string();
    session.close().expect("close");
    for header in cookies.take() {
        info!("Set-Cookie: {}", header);
    }

    // Second request: the client sent the cookie back
    let mut session = SessionManager::with_handler(storage.clone());
    session.set_id(&id).expect("set id");
    info!("user = {:?}", session.get("user").expect("get"));
    info!("notice = {:?}", session.flash("notice", None).expect("flash"));
    info!("notice again = {:?}", session.flash("notice", None).expect("flash"));
    session.close().expect("close");

    let record = storage.fetch_record(&id).expect("fetch").expect("stored row");
    info!(
        "Row {}: created {}, last impression {}, payload {}",
        record.id,
        record.created,
        record.last_impression,
        String::from_utf8_lossy(&record.data)
    );
    info!("{} session(s) stored", storage.count().expect("count"));

    // Same flow against the file backend
    let file_dir = out_dir.join("files");
    let mut session =
        SessionManager::with_handler(Arc::new(FileStorage::new(&file_dir).expect("file storage")));
    session.set("visits", 1).expect("set");
    session.close().expect("close");
    info!(
        "File session {} written under {}",
        session.get_id().expect("id"),
        file_dir.display()
    );

    info!("Removed {} idle session(s)", storage.purge_expired(86_400).expect("gc"));
}
