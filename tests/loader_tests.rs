//! Integration tests for the source loader.
//!
//! URL sources are served by a minimal HTTP responder on a local socket.

use portfolio_config::config::loader::LoadStatus;
use portfolio_config::config::{
    ConfigSource, EnvAdapter, ManualClock, MapEnv, SourceLoader,
};
use portfolio_config::error::ConfigError;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `body` with `status` to every connection. Returns the base URL and a hit counter.
async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/site.json", addr), hits)
}

fn loader() -> SourceLoader {
    SourceLoader::new(EnvAdapter::from_map(MapEnv::new()))
}

#[tokio::test]
async fn url_source_returns_json_body() {
    let (url, hits) = serve("200 OK", r#"{"personal": {"name": "Remote"}}"#).await;
    let value = loader()
        .load_from_source(&ConfigSource::url(&url, 25))
        .await
        .unwrap();
    assert_eq!(value, json!({"personal": {"name": "Remote"}}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn url_source_rejects_error_status() {
    let (url, _) = serve("500 Internal Server Error", "{}").await;
    let result = loader().load_from_source(&ConfigSource::url(&url, 25)).await;
    assert!(matches!(result, Err(ConfigError::Http { .. })));
}

#[tokio::test]
async fn cached_url_source_fetched_once_within_ttl() {
    let (url, hits) = serve("200 OK", r#"{"a": 1}"#).await;
    let clock = Arc::new(ManualClock::new(0));
    let loader = loader().with_clock(clock.clone());
    let source = ConfigSource::url(&url, 25).cached(1_000);

    loader.load_from_source(&source).await.unwrap();
    loader.load_from_source(&source).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(loader.stats().fetches, 1);

    clock.advance(1_000);
    loader.load_from_source(&source).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(loader.stats().cache_misses, 2);
}

#[tokio::test]
async fn environment_source_maps_variables() {
    let env = EnvAdapter::from_map(
        MapEnv::new()
            .with("PORTFOLIO_PUBLIC_NAME", "Ada")
            .with("PORTFOLIO_PUBLIC_ENABLE_BLOG", "true")
            .with("SMTP_PORT", "587")
            .with("PORTFOLIO_CONFIG_JSON", r##"{"theme": {"primaryColor": "#000000"}}"##),
    );
    let value = SourceLoader::new(env)
        .load_from_source(&ConfigSource::environment(40))
        .await
        .unwrap();

    assert_eq!(value["personal"]["name"], "Ada");
    assert_eq!(value["features"]["blog"], true);
    assert_eq!(value["contact"]["smtp"]["port"], 587);
    assert_eq!(value["theme"]["primaryColor"], "#000000");
}

#[tokio::test]
async fn missing_required_variable_fails_environment_source() {
    let env = EnvAdapter::from_map(MapEnv::new().with("SMTP_HOST", "mail.example.com"))
        .with_required(["SMTP_HOST", "SMTP_PASSWORD"]);
    let outcomes = SourceLoader::new(env)
        .load_all(&[ConfigSource::builtin(0), ConfigSource::environment(40)])
        .await;

    assert!(matches!(outcomes[0].status, LoadStatus::Loaded(_)));
    assert!(matches!(
        &outcomes[1].status,
        LoadStatus::Failed(ConfigError::MissingRequired(name)) if name == "SMTP_PASSWORD"
    ));
}

#[tokio::test]
async fn load_all_mixes_formats_and_reports_each_source() {
    let temp = TempDir::new().unwrap();
    let yaml = temp.path().join("site.yml");
    std::fs::write(&yaml, "personal:\n  name: Yaml\n").unwrap();
    let toml = temp.path().join("site.toml");
    std::fs::write(&toml, "name = 'x'").unwrap();

    let sources = vec![
        ConfigSource::file(&toml, 30),
        ConfigSource::file(&yaml, 20),
        ConfigSource::builtin(0),
    ];
    let outcomes = loader().load_all(&sources).await;

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0].status, LoadStatus::Loaded(_)));
    assert!(matches!(
        &outcomes[1].status,
        LoadStatus::Loaded(v) if v["personal"]["name"] == "Yaml"
    ));
    assert!(matches!(
        outcomes[2].status,
        LoadStatus::Failed(ConfigError::UnsupportedFormat(_))
    ));
}
