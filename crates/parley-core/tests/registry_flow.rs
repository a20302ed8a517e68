//! End-to-end registry flows against a loopback settings server.

use std::path::Path;
use std::time::Duration;

use axum::{Json, Router, routing::get};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use parley_core::{DEFAULT_ICON, DomainRegistry, RegistryError, import_preset_organizations};

async fn spawn_app(app: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (origin, handle)
}

/// A server that answers like a real chat realm: settings endpoint plus a
/// small icon body.
async fn spawn_realm(realm_name: &str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());

    let settings_origin = origin.clone();
    let settings_name = realm_name.to_string();
    let app = Router::new()
        .route(
            "/api/v1/server_settings",
            get(move || {
                let origin = settings_origin.clone();
                let name = settings_name.clone();
                async move {
                    Json(json!({
                        "realm_icon": "/static/icon.png",
                        "realm_uri": origin,
                        "realm_name": name,
                    }))
                }
            }),
        )
        .route(
            "/static/icon.png",
            get(|| async { vec![0x89u8, b'P', b'N', b'G'] }),
        );

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (origin, handle)
}

/// An address nothing is listening on.
async fn dead_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    origin
}

#[tokio::test]
async fn add_flow_registers_and_caches_icon() {
    let (origin, _server) = spawn_realm("Example & Co").await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let record = registry.check_domain(&origin, false, false).await.unwrap();
    assert_eq!(record.url, origin);
    assert_eq!(record.alias, "Example &amp; Co");
    assert_eq!(record.icon, format!("{origin}/static/icon.png"));
    assert!(!record.ignore_certs);
    assert!(!record.logged_in);

    registry.add(record).await.unwrap();

    let stored = registry.get(0).unwrap();
    assert_ne!(stored.icon, DEFAULT_ICON);
    assert!(stored.icon.ends_with(".png"));
    let icon_path = Path::new(&stored.icon);
    assert!(icon_path.exists(), "icon should be cached on disk");
    assert_eq!(icon_path.parent().unwrap().file_name().unwrap(), "server-icons");
}

#[tokio::test]
async fn second_add_of_same_url_is_a_duplicate() {
    let (origin, _server) = spawn_realm("Example").await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let record = registry.check_domain(&origin, false, false).await.unwrap();
    registry.add(record).await.unwrap();

    let err = registry.check_domain(&origin, false, false).await.unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateServer { .. }));
    assert_eq!(registry.list().unwrap().len(), 1);
}

#[tokio::test]
async fn reachable_server_without_realm_icon_hosts_no_organizations() {
    let app = Router::new().route("/api/v1/server_settings", get(|| async { Json(json!({})) }));
    let (origin, _server) = spawn_app(app).await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let err = registry.check_domain(&origin, false, false).await.unwrap_err();
    assert!(matches!(err, RegistryError::NoOrganizations { .. }));
    assert!(registry.list().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_server_is_invalid_not_certificate() {
    let origin = dead_origin().await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let err = registry.check_domain(&origin, false, false).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidServer { .. }));
}

#[tokio::test]
async fn missing_icon_degrades_to_default_sentinel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let settings_origin = origin.clone();
    // Settings name an icon the server never serves; the icon GET is a 404.
    let app = Router::new().route(
        "/api/v1/server_settings",
        get(move || {
            let origin = settings_origin.clone();
            async move {
                Json(json!({
                    "realm_icon": "/missing.png",
                    "realm_uri": origin,
                    "realm_name": "Example",
                }))
            }
        }),
    );
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let record = registry.check_domain(&origin, false, false).await.unwrap();
    registry.add(record).await.unwrap();

    assert_eq!(registry.get(0).unwrap().icon, DEFAULT_ICON);
}

#[tokio::test]
async fn silent_refresh_failure_keeps_stored_record() {
    let (origin, server) = spawn_realm("Example").await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let record = registry.check_domain(&origin, false, false).await.unwrap();
    registry.add(record).await.unwrap();
    let before = registry.get(0).unwrap();

    server.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;

    registry.refresh(&before.url, 0).await;

    assert_eq!(registry.get(0).unwrap(), before);
}

#[tokio::test]
async fn refresh_preserves_identity_and_login_state() {
    let (origin, _server) = spawn_realm("Example").await;
    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let record = registry.check_domain(&origin, false, false).await.unwrap();
    registry.add(record).await.unwrap();

    let mut stored = registry.get(0).unwrap();
    stored.logged_in = true;
    registry.update(0, stored.clone()).unwrap();

    registry.refresh(&stored.url, 0).await;

    let refreshed = registry.get(0).unwrap();
    assert_eq!(refreshed.id, stored.id);
    assert!(refreshed.logged_in);
    assert_eq!(refreshed.url, stored.url);
}

#[tokio::test]
async fn preset_import_keeps_successes_and_names_failures() {
    let (alpha, _alpha_server) = spawn_realm("Alpha").await;
    let (beta, _beta_server) = spawn_realm("Beta").await;
    let dead = dead_origin().await;

    let dir = tempfile::tempdir().unwrap();
    let registry = DomainRegistry::new(dir.path()).unwrap();

    let urls = vec![alpha.clone(), beta.clone(), dead.clone()];
    let report = import_preset_organizations(&registry, &urls).await.unwrap();

    assert_eq!(report.added, vec![alpha.clone(), beta.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dead);
    assert!(report.changed());
    assert!(report.failure_summary().unwrap().contains(&dead));
    assert_eq!(registry.list().unwrap().len(), 2);

    // A second import of the same list only skips.
    let report = import_preset_organizations(&registry, &[alpha.clone(), beta.clone()])
        .await
        .unwrap();
    assert!(!report.changed());
    assert_eq!(report.skipped, vec![alpha, beta]);
}

#[tokio::test]
async fn corrupt_store_surfaces_one_startup_warning_and_resets() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("config").join("domains.json");
    std::fs::create_dir_all(store_path.parent().unwrap()).unwrap();
    std::fs::write(&store_path, "{definitely not json").unwrap();

    let registry = DomainRegistry::new(dir.path()).unwrap();
    let warnings = registry.startup().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(registry.list().unwrap().is_empty());
    assert!(registry.startup().unwrap().is_empty());
}
