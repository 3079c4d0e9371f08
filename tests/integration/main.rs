//! Integration tests for Quill

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary with an isolated config path and no env overrides
    fn quill(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("quill");
        cmd.env("QUILL_CONFIG", dir.path().join("config.toml"))
            .env_remove("QUILL_REPO_URL")
            .env_remove("QUILL_REPO_BRANCH")
            .env_remove("QUILL_ACCESS_TOKEN")
            .env("CI", "1");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("static site deploys"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("quill"));
    }

    #[test]
    fn config_path_honors_env() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                dir.path().join("config.toml").to_string_lossy().to_string(),
            ));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[deploy]"))
            .stdout(predicate::str::contains("npx"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(written.contains("refresh_interval_secs = 300"));

        quill(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn config_show_masks_token() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .env("QUILL_ACCESS_TOKEN", "hunter2hunter2")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[cache\nbroken").unwrap();
        quill(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn token_is_generated() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .args(["token", "--length", "24"])
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[A-Za-z0-9]{24}\n$").unwrap());
    }

    #[test]
    fn deploy_without_configured_token_fails() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .args(["deploy", "--token", "anything"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Access token not configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn deploy_with_wrong_token_is_rejected() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .env("QUILL_ACCESS_TOKEN", "correct-token")
            .args(["deploy", "--token", "wrong-token"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid or expired token"));
    }

    #[test]
    fn refresh_without_repo_fails() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .arg("refresh")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Repository URL not configured"));
    }

    #[test]
    fn build_without_repo_stops_at_sync() {
        let dir = TempDir::new().unwrap();
        quill(&dir)
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("step 'sync'"));
    }
}
