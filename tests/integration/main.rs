//! Integration tests for gitvault

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn gitvault() -> Command {
        let mut cmd = cargo_bin_cmd!("gitvault");
        cmd.env_remove("GITVAULT_CONFIG")
            .env_remove("GITHUB_REPO_OWNER")
            .env_remove("GITHUB_REPO_NAME")
            .env_remove("GITHUB_BRANCH");
        cmd
    }

    /// Config file selecting the in-process backend
    fn memory_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remote]\nbackend = \"memory\"\n").unwrap();
        path
    }

    #[test]
    fn help_displays() {
        gitvault()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("durable key/value storage"));
    }

    #[test]
    fn version_displays() {
        gitvault()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gitvault"));
    }

    #[test]
    fn config_path() {
        gitvault()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(dir.path().join("absent.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[remote]"))
            .stdout(predicate::str::contains("flush_interval_secs = 30"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gitvault").join("config.toml");

        gitvault()
            .arg("-c")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();

        assert!(path.exists());
    }

    #[test]
    fn invalid_config_shows_hint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remote\n").unwrap();

        gitvault()
            .arg("-c")
            .arg(&path)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn github_backend_requires_owner() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(dir.path().join("absent.toml"))
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("remote.owner"))
            .stderr(predicate::str::contains("GITHUB_REPO_OWNER"));
    }

    #[test]
    fn status_with_memory_backend() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("In-memory store"))
            .stdout(predicate::str::contains("All changes saved"));
    }

    #[test]
    fn set_stores_value() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["set", "data/notes.json", r#"{"a": 1}"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("Saved data/notes.json"));
    }

    #[test]
    fn set_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["set", "data/notes.json", "not json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not valid JSON"));
    }

    #[test]
    fn get_preloaded_path() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["get", "data/users.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("{}"));
    }

    #[test]
    fn get_unknown_path_reports_miss() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["get", "data/typo.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing stored at data/typo.json"));
    }

    #[test]
    fn large_get_missing_fails() {
        let dir = TempDir::new().unwrap();
        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["large", "get", "nothing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No large object named nothing"));
    }

    #[test]
    fn large_put_reports_layout() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.json");
        std::fs::write(&file, r#"{"rows": [1, 2, 3]}"#).unwrap();

        gitvault()
            .arg("-c")
            .arg(memory_config(&dir))
            .args(["large", "put", "doc"])
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("single object"));
    }
}

mod vault_tests {
    use gitvault::config::Config;
    use gitvault::large::{ChunkLimits, LargeLayout, LargeObjectStore};
    use gitvault::remote::{MemoryTransport, RemoteClient, RetryPolicy};
    use gitvault::store::DEFAULT_CATEGORY;
    use gitvault::Vault;
    use serde_json::json;
    use std::sync::Arc;

    async fn open(transport: &Arc<MemoryTransport>) -> Vault {
        Vault::with_transport(transport.clone(), &Config::default())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn two_vaults_converge_on_last_writer() {
        let transport = Arc::new(MemoryTransport::new());
        let first = open(&transport).await;
        let second = open(&transport).await;

        first.users().save("u1", json!({"name": "A"}).as_object().cloned().unwrap()).await;
        first.cache().flush_all().await;

        second.users().save("u1", json!({"name": "B"}).as_object().cloned().unwrap()).await;
        let report = second.cache().flush_all().await;
        assert!(report.is_clean());

        // Each shutdown force-flushes; the later one wins
        first.shutdown().await;
        second.shutdown().await;

        let reader = open(&transport).await;
        assert_eq!(reader.users().get("u1").await.unwrap()["name"], json!("B"));
        reader.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn memory_categories_do_not_leak() {
        let transport = Arc::new(MemoryTransport::new());
        let vault = open(&transport).await;

        vault.memory().remember("k", json!("v"), "a").await;

        assert_eq!(vault.memory().recall("k", "b").await, None);
        assert_eq!(vault.memory().recall("k", DEFAULT_CATEGORY).await, None);
        assert_eq!(vault.memory().recall("k", "a").await, Some(json!("v")));
        vault.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn large_values_survive_a_restart() {
        let transport = Arc::new(MemoryTransport::new());
        let client = RemoteClient::new(transport.clone(), RetryPolicy::default());
        let limits = ChunkLimits {
            single_object_max: 4096,
            chunk_size: 1500,
        };
        let store = LargeObjectStore::new(client.clone(), "data/large", limits);
        let value: Vec<u32> = (0..2000).collect();

        let layout = store.encode("numbers", &value).await.unwrap();
        assert!(matches!(layout, LargeLayout::Chunked { chunks } if chunks > 1));

        let fresh = LargeObjectStore::new(client, "data/large", limits);
        let back: Vec<u32> = fresh.decode("numbers").await.unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test(start_paused = true)]
    async fn backup_captures_current_values() {
        let transport = Arc::new(MemoryTransport::new());
        let vault = open(&transport).await;
        vault.collections().set_value("books", "b1", json!({"t": "Dune"})).await;

        let report = vault.create_backup().await.unwrap();

        assert_eq!(report.written.len(), 4);
        let copy = format!("data/backup/{}/database.json", report.timestamp);
        let stored: serde_json::Value = serde_json::from_slice(&transport.get(&copy).unwrap()).unwrap();
        assert_eq!(stored["books"]["b1"]["t"], json!("Dune"));
        vault.shutdown().await;
    }
}
