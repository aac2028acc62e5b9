//! Integration tests for the configuration manager.
//!
//! These tests drive full resolution passes over on-disk sources: merge order,
//! template resolution, validation with rollback, fallback on total failure,
//! reload notification, caching, and serialized writers.

use portfolio_config::config::defaults::default_config;
use portfolio_config::config::{
    ChangeKind, ConfigChange, ConfigManager, ConfigSource, EnvAdapter, Environment, ManagerOptions,
    ManagerState, ManualClock, MapEnv, SetOptions,
};
use portfolio_config::error::ConfigError;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

fn options(sources: Vec<ConfigSource>) -> ManagerOptions {
    ManagerOptions::default()
        .with_env(EnvAdapter::from_map(MapEnv::new()))
        .with_environment(Environment::Test)
        .with_sources(sources)
}

async fn manager_with(sources: Vec<ConfigSource>) -> ConfigManager {
    let manager = ConfigManager::new(options(sources));
    let loaded = manager.initialize().await.unwrap();
    assert!(loaded.is_valid, "unexpected errors: {:?}", loaded.errors);
    manager
}

type Recorded = Arc<Mutex<Vec<Vec<ConfigChange>>>>;

fn record_changes(manager: &ConfigManager) -> Recorded {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    manager.on_change(move |_, _, changes| sink.lock().unwrap().push(changes.to_vec()));
    recorded
}

#[tokio::test]
async fn higher_priority_scalar_wins_and_siblings_survive() {
    let temp = TempDir::new().unwrap();
    let a = write_json(temp.path(), "a.json", json!({"theme": {"primaryColor": "#111"}}));
    let b = write_json(
        temp.path(),
        "b.json",
        json!({"theme": {"primaryColor": "#222", "accentColor": "#333"}}),
    );

    let manager = manager_with(vec![
        ConfigSource::builtin(-1),
        ConfigSource::file(&a, 0),
        ConfigSource::file(&b, 10),
    ])
    .await;

    assert_eq!(manager.get("theme.primaryColor"), Some(json!("#222")));
    assert_eq!(manager.get("theme.accentColor"), Some(json!("#333")));
    assert_eq!(manager.get("theme.secondaryColor"), Some(json!("#64748b")));
    assert_eq!(manager.get("personal.name"), Some(json!("Your Name")));
}

#[tokio::test]
async fn arrays_are_replaced_not_concatenated() {
    let temp = TempDir::new().unwrap();
    let low = write_json(temp.path(), "low.json", json!({"seo": {"keywords": ["a"]}}));
    let high = write_json(temp.path(), "high.json", json!({"seo": {"keywords": ["b", "c"]}}));

    let manager = manager_with(vec![
        ConfigSource::builtin(0),
        ConfigSource::file(&low, 10),
        ConfigSource::file(&high, 20),
    ])
    .await;

    assert_eq!(manager.get("seo.keywords"), Some(json!(["b", "c"])));
}

#[tokio::test]
async fn merge_follows_priority_not_declaration_order() {
    let temp = TempDir::new().unwrap();
    let high = write_json(temp.path(), "high.json", json!({"personal": {"name": "High"}}));
    let low = write_json(temp.path(), "low.json", json!({"personal": {"name": "Low"}}));
    let tie = write_json(temp.path(), "tie.json", json!({"personal": {"title": "Tie"}}));
    let tie_later = write_json(temp.path(), "tie2.json", json!({"personal": {"title": "Later"}}));

    let manager = manager_with(vec![
        ConfigSource::file(&high, 30),
        ConfigSource::file(&tie, 20),
        ConfigSource::file(&low, 10),
        ConfigSource::file(&tie_later, 20),
        ConfigSource::builtin(0),
    ])
    .await;

    assert_eq!(manager.get("personal.name"), Some(json!("High")));
    assert_eq!(manager.get("personal.title"), Some(json!("Later")));

    let order: Vec<i32> = manager.current().sources.iter().map(|s| s.priority).collect();
    assert_eq!(order, vec![0, 10, 20, 20, 30]);
}

#[tokio::test]
async fn tier_overlay_sits_between_defaults_and_files() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"build": {"cache": false}}));

    let manager = ConfigManager::new(
        options(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)])
            .with_environment(Environment::Production),
    );
    manager.initialize().await.unwrap();

    assert_eq!(manager.get("build.optimizeAssets"), Some(json!(true)));
    assert_eq!(manager.get("build.cache"), Some(json!(false)));
}

#[tokio::test]
async fn templates_resolve_against_merged_tree() {
    let temp = TempDir::new().unwrap();
    let site = write_json(
        temp.path(),
        "site.json",
        json!({
            "personal": {"name": "Ada"},
            "seo": {"title": "{{personal.name|uppercase}}"},
            "contact": {"successMessage": "{{custom.greeting}}, thanks!"}
        }),
    );

    let manager = ConfigManager::new(
        options(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)])
            .with_custom_var("greeting", "Hello"),
    );
    manager.initialize().await.unwrap();

    assert_eq!(manager.get("seo.title"), Some(json!("ADA")));
    assert_eq!(manager.get("contact.successMessage"), Some(json!("Hello, thanks!")));
}

#[tokio::test]
async fn unresolved_template_stays_literal_with_warning() {
    let temp = TempDir::new().unwrap();
    let site = write_json(
        temp.path(),
        "site.json",
        json!({"seo": {"description": "By {{personal.nickname}}"}}),
    );

    let manager = manager_with(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)]).await;
    let current = manager.current();

    assert_eq!(
        manager.get("seo.description"),
        Some(json!("By {{personal.nickname}}"))
    );
    assert!(current.warnings.iter().any(|w| w.contains("personal.nickname")));
}

#[tokio::test]
async fn invalid_set_rolls_back() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    let changes = record_changes(&manager);
    let version = manager.version();

    let result = manager
        .set("contact.email", json!(12345), SetOptions::default())
        .await;

    match result {
        Err(ConfigError::Validation(issues)) => {
            assert!(issues.iter().any(|i| i.path == "contact.email"), "{:?}", issues);
        }
        other => panic!("expected validation error, got {:?}", other.map(|l| l.version)),
    }
    assert_eq!(manager.get("contact.email"), Some(json!("hello@example.com")));
    assert_eq!(manager.version(), version);
    assert_eq!(manager.state(), ManagerState::Valid);
    assert!(changes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn valid_set_notifies_with_changes() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    let changes = record_changes(&manager);

    let loaded = manager
        .set("theme.primaryColor", json!("#ff0000"), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(loaded.version, 2);

    let recorded = changes.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].len(), 1);
    assert_eq!(recorded[0][0].path, vec!["theme", "primaryColor"]);
    assert_eq!(recorded[0][0].kind, ChangeKind::Modified);
    assert_eq!(recorded[0][0].old_value, Some(json!("#2563eb")));
    assert_eq!(recorded[0][0].new_value, Some(json!("#ff0000")));
}

#[tokio::test]
async fn silent_set_skips_listeners() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    let changes = record_changes(&manager);

    manager
        .set("personal.location", json!("Paris"), SetOptions::default().silent())
        .await
        .unwrap();
    assert_eq!(manager.get("personal.location"), Some(json!("Paris")));
    assert!(changes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn set_resolves_templates_in_new_values() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    manager
        .set(
            "personal.tagline",
            json!("{{personal.title|kebab}} at work"),
            SetOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        manager.get("personal.tagline"),
        Some(json!("software-engineer at work"))
    );
}

#[tokio::test]
async fn update_config_merges_at_root() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    manager
        .update_config(
            json!({"personal": {"name": "Grace"}, "features": {"blog": true}}),
            SetOptions::merged(),
        )
        .await
        .unwrap();

    assert_eq!(manager.get("personal.name"), Some(json!("Grace")));
    assert_eq!(manager.get("personal.title"), Some(json!("Software Engineer")));
    assert_eq!(manager.get("features.blog"), Some(json!(true)));
}

#[tokio::test]
async fn panicking_listener_does_not_block_others() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    manager.on_change(|_, _, _| panic!("listener failure"));
    let changes = record_changes(&manager);

    manager
        .set("features.blog", json!(true), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(changes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn every_source_failing_falls_back_to_defaults() {
    let temp = TempDir::new().unwrap();
    let broken = temp.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();

    let manager = ConfigManager::new(options(vec![
        ConfigSource::file(temp.path().join("missing.json"), 10),
        ConfigSource::file(&broken, 20),
    ]));
    let loaded = manager.initialize().await.unwrap();

    assert!(!loaded.is_valid);
    assert_eq!(loaded.errors.len(), 2);
    assert_eq!(loaded.config, default_config());
    assert_eq!(manager.state(), ManagerState::Invalid);
}

#[tokio::test]
async fn failing_source_is_isolated() {
    let temp = TempDir::new().unwrap();
    let good = write_json(temp.path(), "good.json", json!({"personal": {"name": "Ada"}}));

    let manager = manager_with(vec![
        ConfigSource::builtin(0),
        ConfigSource::file(temp.path().join("missing.json"), 5),
        ConfigSource::file(&good, 10),
    ])
    .await;

    assert_eq!(manager.get("personal.name"), Some(json!("Ada")));
    assert!(manager.current().warnings.iter().any(|w| w.contains("missing.json")));
}

#[tokio::test]
async fn invalid_schema_result_is_reported() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"theme": {"primaryColor": "blue"}}));

    let manager = ConfigManager::new(options(vec![
        ConfigSource::builtin(0),
        ConfigSource::file(&site, 10),
    ]));
    let loaded = manager.initialize().await.unwrap();

    assert!(!loaded.is_valid);
    assert!(loaded.errors.iter().any(|i| i.path == "theme.primaryColor"));
    assert_eq!(manager.state(), ManagerState::Invalid);
}

#[tokio::test]
async fn reload_diffs_and_notifies() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"social": {"twitter": "https://x.com/ada"}}));

    let manager = manager_with(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)]).await;
    let changes = record_changes(&manager);

    write_json(temp.path(), "site.json", json!({}));
    let loaded = manager.reload().await.unwrap();
    assert_eq!(loaded.version, 2);

    let recorded = changes.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].len(), 1);
    assert_eq!(recorded[0][0].path, vec!["social", "twitter"]);
    assert_eq!(recorded[0][0].kind, ChangeKind::Removed);
}

#[tokio::test]
async fn invalid_reload_keeps_previous_config() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"theme": {"primaryColor": "#123456"}}));

    let manager = manager_with(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)]).await;
    write_json(temp.path(), "site.json", json!({"theme": {"primaryColor": "blue"}}));

    let attempt = manager.reload().await.unwrap();
    assert!(!attempt.is_valid);
    assert_eq!(manager.get("theme.primaryColor"), Some(json!("#123456")));
    assert_eq!(manager.version(), 1);
    assert_eq!(manager.state(), ManagerState::Valid);
}

#[tokio::test]
async fn cached_source_served_until_ttl_expires() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"personal": {"name": "First"}}));
    let clock = Arc::new(ManualClock::new(0));

    let manager = ConfigManager::new(
        options(vec![
            ConfigSource::builtin(0),
            ConfigSource::file(&site, 10).cached(60_000),
        ])
        .with_clock(clock.clone()),
    );
    manager.initialize().await.unwrap();

    write_json(temp.path(), "site.json", json!({"personal": {"name": "Second"}}));
    manager.reload().await.unwrap();
    assert_eq!(manager.get("personal.name"), Some(json!("First")));
    assert_eq!(manager.loader().stats().cache_hits, 1);

    clock.advance(60_000);
    manager.reload().await.unwrap();
    assert_eq!(manager.get("personal.name"), Some(json!("Second")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_are_serialized() {
    let manager = Arc::new(manager_with(vec![ConfigSource::builtin(0)]).await);
    manager.reload().await.unwrap();
    let flags = ["blog", "chatbot", "contactForm", "analytics", "darkMode", "animations"];

    let mut handles = Vec::new();
    for (i, flag) in flags.iter().enumerate() {
        let manager = manager.clone();
        let path = format!("features.{}", flag);
        let enabled = i % 2 == 0;
        handles.push(tokio::spawn(async move {
            manager.set(&path, json!(enabled), SetOptions::default()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(manager.version(), 2 + flags.len() as u64);
    for (i, flag) in flags.iter().enumerate() {
        assert_eq!(
            manager.get(&format!("features.{}", flag)),
            Some(json!(i % 2 == 0)),
            "lost write to features.{}",
            flag
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn read_modify_write_keeps_every_update() {
    let manager = Arc::new(manager_with(vec![ConfigSource::builtin(0)]).await);
    let path = manager.path("seo.keywords").unwrap();
    let before = manager.get("seo.keywords").unwrap().as_array().unwrap().len();

    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = manager.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            manager
                .update_at(
                    &path,
                    |current| {
                        let mut keywords = current.and_then(Value::as_array).cloned().unwrap_or_default();
                        keywords.push(json!(format!("keyword-{}", i)));
                        Ok(Value::Array(keywords))
                    },
                    SetOptions::default(),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let keywords = manager.get("seo.keywords").unwrap();
    assert_eq!(keywords.as_array().unwrap().len(), before + 16);
    for i in 0..16 {
        assert!(keywords.as_array().unwrap().contains(&json!(format!("keyword-{}", i))));
    }
}

#[tokio::test]
async fn failed_update_leaves_config_untouched() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;
    let version = manager.version();
    let path = manager.path("seo.keywords").unwrap();

    let result = manager
        .update_at(
            &path,
            |_| Err(ConfigError::not_found("keyword", "rust")),
            SetOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(ConfigError::NotFound { kind: "keyword", .. })));
    assert_eq!(manager.version(), version);
}

#[tokio::test]
async fn set_resolves_only_the_written_value() {
    let temp = TempDir::new().unwrap();
    let site = write_json(
        temp.path(),
        "site.json",
        json!({"seo": {"description": "{{personal.title}} at Acme"}}),
    );
    let manager = ConfigManager::new(
        options(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)]).with_templates(false),
    );
    manager.initialize().await.unwrap();
    let recorded = record_changes(&manager);

    manager
        .set("features.blog", json!(true), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(
        manager.get("seo.description"),
        Some(json!("{{personal.title}} at Acme"))
    );
    let changes = recorded.lock().unwrap().pop().unwrap();
    let paths: Vec<String> = changes.iter().map(ConfigChange::dotted_path).collect();
    assert_eq!(paths, vec!["features.blog"]);

    manager
        .set("personal.title", json!("Staff Engineer"), SetOptions::default())
        .await
        .unwrap();
    manager
        .set("seo.title", json!("{{personal.name}} | {{personal.title}}"), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(manager.get("seo.title"), Some(json!("Your Name | Staff Engineer")));
    assert_eq!(
        manager.get("seo.description"),
        Some(json!("{{personal.title}} at Acme"))
    );
}

#[tokio::test]
async fn nested_template_references_resolve_once() {
    let temp = TempDir::new().unwrap();
    let site = write_json(
        temp.path(),
        "site.json",
        json!({
            "personal": {"name": "Ada", "tagline": "{{personal.name}} builds things"},
            "seo": {"description": "{{personal.tagline}}"}
        }),
    );
    let manager = manager_with(vec![ConfigSource::builtin(0), ConfigSource::file(&site, 10)]).await;
    assert_eq!(manager.get("seo.description"), Some(json!("Ada builds things")));
    assert!(manager.current().warnings.is_empty(), "{:?}", manager.current().warnings);

    let recorded = record_changes(&manager);
    let resolved = manager.current().config.clone();
    manager
        .update_config(resolved.clone(), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(manager.current().config, resolved);
    assert!(recorded.lock().unwrap().pop().unwrap().is_empty());
}

/// Serve `body` to every connection after `delay`.
async fn serve_slowly(body: &'static str, delay: Duration) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}/site.json", addr)
}

#[tokio::test]
async fn destroy_discards_pass_in_flight() {
    let url = serve_slowly(r#"{"personal": {"name": "Late"}}"#, Duration::from_millis(300)).await;
    let manager = ConfigManager::new(options(vec![
        ConfigSource::builtin(0),
        ConfigSource::url(&url, 10),
    ]));

    let (result, ()) = tokio::join!(manager.initialize(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.destroy();
    });

    assert!(matches!(result, Err(ConfigError::Destroyed)));
    assert_eq!(manager.state(), ManagerState::Destroyed);
    assert_eq!(manager.get("personal.name"), None);
    assert_eq!(manager.version(), 0);
}

#[tokio::test]
async fn get_helpers() {
    let manager = manager_with(vec![ConfigSource::builtin(0)]).await;

    assert_eq!(manager.get("personal.missing.deeper"), None);
    assert_eq!(manager.get_or("personal.missing", json!("fallback")), json!("fallback"));
    assert_eq!(manager.get("skills.0.name"), Some(json!("Rust")));

    let keywords: Option<Vec<String>> = manager.get_typed("seo.keywords").unwrap();
    assert_eq!(keywords.unwrap(), vec!["portfolio", "software engineer"]);
    assert!(manager.path("theme.primaryColor.hex").is_err());
}

#[tokio::test]
async fn hot_reload_picks_up_file_changes() {
    let temp = TempDir::new().unwrap();
    let site = write_json(temp.path(), "site.json", json!({"personal": {"name": "Before"}}));

    let manager = ConfigManager::start(
        options(vec![
            ConfigSource::builtin(0),
            ConfigSource::file(&site, 10).cached(0),
        ])
        .with_watch(Duration::from_millis(100)),
    )
    .await
    .unwrap();
    assert!(manager.is_watching());

    tokio::time::sleep(Duration::from_millis(200)).await;
    write_json(temp.path(), "site.json", json!({"personal": {"name": "After"}}));

    let mut name = manager.get("personal.name");
    for _ in 0..100 {
        if name == Some(json!("After")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        name = manager.get("personal.name");
    }
    assert_eq!(name, Some(json!("After")));

    manager.destroy();
    assert!(!manager.is_watching());
    assert_eq!(manager.state(), ManagerState::Destroyed);
}
