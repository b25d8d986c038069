//! Integration tests for depcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    const MISSING_SOLVER: &str = "depcache-no-such-solver-binary";

    /// Command isolated from the user's config and cache
    fn depcache(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("depcache");
        cmd.env_remove("DEPCACHE_SOLVER")
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--cache-dir")
            .arg(temp.path().join("cache"));
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("depcache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Dependency resolution cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("depcache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depcache"));
    }

    #[test]
    fn cache_info_on_fresh_dir() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Entries:         0"));
        assert!(temp.path().join("cache").is_dir());
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached resolutions found"));
    }

    #[test]
    fn cache_list_json_empty() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_empty() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["cache", "clear", "-y"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached resolutions to clear"));
    }

    #[test]
    fn cache_clear_rejects_bad_fingerprint() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["cache", "clear", "--fingerprint", "not-a-fingerprint"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid fingerprint"));
    }

    #[test]
    fn cache_dir_that_is_a_file_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("occupied");
        std::fs::write(&file, "x").unwrap();

        cargo_bin_cmd!("depcache")
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--cache-dir")
            .arg(&file)
            .args(["cache", "info"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache directory unusable"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[resolver]"))
            .stdout(predicate::str::contains("pip-compile"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());

        depcache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[resolver\n").unwrap();
        depcache(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn resolve_without_solver_fails() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "resolve", "requests>=2.25.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Solver unavailable"))
            .stderr(predicate::str::contains("pip-tools"));
    }

    #[test]
    fn resolve_rejects_invalid_specifier() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "resolve", "requests>>=2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid requirement specifier"));
    }

    #[test]
    fn resolve_requires_input() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .current_dir(temp.path())
            .arg("resolve")
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "No requirements files matching 'requirements.txt' found",
            ));
    }

    #[test]
    fn resolve_discovers_requirement_files() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(project.join("svc-a")).unwrap();
        std::fs::create_dir_all(project.join(".venv")).unwrap();
        std::fs::write(project.join("svc-a/requirements.txt"), "# empty\n").unwrap();
        std::fs::write(project.join(".venv/requirements.txt"), "requests\n").unwrap();

        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "resolve", "--search-dirs"])
            .arg(&project)
            .assert()
            .success()
            .stdout(predicate::str::contains("svc-a/requirements.txt"))
            .stdout(predicate::str::contains("Resolved 1 of 1 module(s)"));
    }

    #[test]
    fn refresh_discovers_with_pattern() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("requirements-dev.txt"), "# empty\n").unwrap();
        std::fs::write(project.join("requirements.txt"), "# empty\n").unwrap();

        depcache(&temp)
            .current_dir(&project)
            .args(["--solver", MISSING_SOLVER, "refresh", "-p", "requirements*.txt"])
            .assert()
            .success()
            .stdout(predicate::str::contains("requirements-dev.txt"))
            .stdout(predicate::str::contains("Refreshed 2 of 2 module(s)"));
    }

    #[test]
    fn upgrade_prints_fresh_pins() {
        let temp = TempDir::new().unwrap();
        let reqs = temp.path().join("api.txt");
        std::fs::write(&reqs, "# nothing pinned yet\n").unwrap();

        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "upgrade", "-r"])
            .arg(&reqs)
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to pin"));
    }

    #[test]
    fn upgrade_without_solver_fails() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "upgrade", "requests"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Solver unavailable"));
    }

    #[test]
    fn resolve_comment_only_file_needs_no_solver() {
        let temp = TempDir::new().unwrap();
        let reqs = temp.path().join("requirements.txt");
        std::fs::write(&reqs, "# nothing pinned yet\n").unwrap();

        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "resolve", "-r"])
            .arg(&reqs)
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to pin"));

        depcache(&temp)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());
    }

    #[test]
    fn refresh_reports_failed_modules() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("mod_a.txt");
        let b = temp.path().join("mod_b.txt");
        std::fs::write(&a, "requests>=2.25.0\n").unwrap();
        std::fs::write(&b, "# empty\n").unwrap();

        depcache(&temp)
            .args(["--solver", MISSING_SOLVER, "refresh", "-r"])
            .arg(&a)
            .arg(&b)
            .assert()
            .failure()
            .stdout(predicate::str::contains("mod_a"))
            .stdout(predicate::str::contains("Refreshed 1 of 2 module(s)"))
            .stderr(predicate::str::contains("1 module(s) failed to resolve"));
    }

    #[test]
    fn refresh_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        depcache(&temp)
            .args(["refresh", "-r"])
            .arg(temp.path().join("absent.txt"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("IO error"));
    }
}
