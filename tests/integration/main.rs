//! Integration tests for the builder and launcher binaries

#[cfg(unix)]
mod support {
    use buildpack_lifecycle::config::buildpack_key;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Read;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Scratch layout for one builder run
    pub struct Stage {
        pub temp: TempDir,
    }

    impl Stage {
        pub fn new() -> Self {
            let stage = Self {
                temp: TempDir::new().unwrap(),
            };
            fs::create_dir_all(stage.build_dir()).unwrap();
            stage
        }

        pub fn path(&self, rel: &str) -> PathBuf {
            self.temp.path().join(rel)
        }

        pub fn build_dir(&self) -> PathBuf {
            self.path("contents/app")
        }

        pub fn droplet(&self) -> PathBuf {
            self.path("out/droplet.tgz")
        }

        pub fn cache_archive(&self) -> PathBuf {
            self.path("out/cache.tgz")
        }

        pub fn result(&self) -> serde_json::Value {
            serde_json::from_str(&fs::read_to_string(self.path("out/result.json")).unwrap())
                .unwrap()
        }

        /// Write `bin/<hook>` for a system buildpack
        pub fn hook(&self, name: &str, hook: &str, body: &str) {
            let bin = self.path("buildpacks").join(buildpack_key(name)).join("bin");
            fs::create_dir_all(&bin).unwrap();
            let path = bin.join(hook);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        pub fn args(&self, order: &[&str]) -> Vec<String> {
            let path = |rel: &str| self.path(rel).to_string_lossy().into_owned();
            vec![
                "--build-dir".into(),
                self.build_dir().to_string_lossy().into_owned(),
                "--buildpacks-dir".into(),
                path("buildpacks"),
                "--buildpack-downloads-dir".into(),
                path("downloads"),
                "--build-artifacts-cache-dir".into(),
                path("cache"),
                "--output-droplet".into(),
                path("out/droplet.tgz"),
                "--output-build-artifacts-cache".into(),
                path("out/cache.tgz"),
                "--output-metadata".into(),
                path("out/result.json"),
                "--buildpack-order".into(),
                order.join(","),
            ]
        }
    }

    /// Member name to file contents (empty for directories)
    pub fn members(archive: &Path) -> BTreeMap<String, String> {
        let mut tar = tar::Archive::new(GzDecoder::new(fs::File::open(archive).unwrap()));
        let mut out = BTreeMap::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            if entry.header().entry_type().is_file() {
                entry.read_to_string(&mut body).unwrap();
            }
            out.insert(name, body);
        }
        out
    }
}

#[cfg(unix)]
mod builder_tests {
    use super::support::{members, Stage};
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use buildpack_lifecycle::config::buildpack_key;
    use predicates::prelude::*;

    fn builder() -> Command {
        let mut cmd = cargo_bin_cmd!("builder");
        cmd.env_remove("VCAP_SERVICES")
            .env_remove("VCAP_PLATFORM_OPTIONS")
            .env_remove("RUST_LOG");
        cmd
    }

    const RELEASE_WEB: &str =
        "printf -- '---\\ndefault_process_types:\\n  web: the start command\\n'";

    #[test]
    fn help_displays() {
        builder()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--buildpack-order"));
    }

    #[test]
    fn missing_order_is_usage_error() {
        let stage = Stage::new();
        builder()
            .args(stage.args(&[]))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("buildpack-order"));
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        builder().arg("--no-such-flag").assert().code(1);
    }

    #[test]
    fn detect_run() {
        let stage = Stage::new();
        stage.hook("always-detects", "detect", "echo 'Always Matching'");
        stage.hook("always-detects", "compile", "touch \"$1/compiled\"");
        stage.hook("always-detects", "release", RELEASE_WEB);
        stage.hook("also-always-detects", "detect", "echo Also");

        builder()
            .args(stage.args(&["always-detects", "also-always-detects"]))
            .assert()
            .success();

        let droplet = members(&stage.droplet());
        assert!(droplet.contains_key("./app/compiled"));
        for dir in ["./app/", "./deps/", "./tmp/", "./logs/"] {
            assert!(droplet.contains_key(dir), "missing {}", dir);
        }
        let info: serde_json::Value =
            serde_json::from_str(&droplet["./staging_info.yml"]).unwrap();
        assert_eq!(info["detected_buildpack"], "Always Matching");
        assert_eq!(info["start_command"], "the start command");

        let result = stage.result();
        assert_eq!(
            result["process_types"],
            serde_json::json!({"web": "the start command"})
        );
        assert_eq!(result["lifecycle_type"], "buildpack");
        assert_eq!(result["lifecycle_metadata"]["buildpack_key"], "always-detects");
        assert_eq!(result["execution_metadata"], "");
    }

    #[test]
    fn skip_detect_with_compile() {
        let stage = Stage::new();
        for name in ["a", "b"] {
            stage.hook(name, "supply", "touch \"$4/$3/supplied\"; touch \"$2/warm\"");
        }
        stage.hook(
            "c",
            "compile",
            "touch \"$1/compiled\"; touch \"$2/compiled\"; [ -z \"$3\" ]",
        );
        stage.hook("c", "release", RELEASE_WEB);

        builder()
            .args(stage.args(&["a", "b", "c"]))
            .arg("--skip-detect")
            .assert()
            .success();

        let droplet = members(&stage.droplet());
        assert!(droplet.contains_key("./deps/0/supplied"));
        assert!(droplet.contains_key("./deps/1/supplied"));
        assert!(!droplet.contains_key("./deps/2/supplied"));

        let cache = members(&stage.cache_archive());
        assert!(cache.contains_key("./final/compiled"));
        for name in ["a", "b"] {
            assert!(cache.contains_key(&format!("./{}/warm", buildpack_key(name))));
        }

        let result = stage.result();
        assert_eq!(result["lifecycle_metadata"]["detected_buildpack"], "");
        assert_eq!(result["lifecycle_metadata"]["buildpack_key"], "c");
    }

    #[test]
    fn skip_detect_with_finalize() {
        let stage = Stage::new();
        for name in ["a", "b", "c"] {
            stage.hook(name, "supply", "touch \"$4/$3/supplied\"");
        }
        stage.hook("c", "finalize", "touch \"$1/finalized\"");
        stage.hook("c", "compile", "touch \"$1/compiled\"");
        stage.hook("c", "release", RELEASE_WEB);

        builder()
            .args(stage.args(&["a", "b", "c"]))
            .arg("--skip-detect")
            .assert()
            .success();

        let droplet = members(&stage.droplet());
        assert!(droplet.contains_key("./deps/2/supplied"));
        assert!(droplet.contains_key("./app/finalized"));
        assert!(!droplet.contains_key("./app/compiled"));
    }

    #[test]
    fn procfile_overrides_release() {
        let stage = Stage::new();
        stage.hook("bp", "detect", "echo Proc");
        stage.hook("bp", "compile", "exit 0");
        stage.hook(
            "bp",
            "release",
            "printf 'default_process_types:\\n  web: bp-cmd\\n'",
        );
        std::fs::write(stage.build_dir().join("Procfile"), "web: pf-cmd\n").unwrap();

        builder().args(stage.args(&["bp"])).assert().success();

        assert_eq!(stage.result()["process_types"]["web"], "pf-cmd");
        let droplet = members(&stage.droplet());
        let info: serde_json::Value =
            serde_json::from_str(&droplet["./staging_info.yml"]).unwrap();
        assert_eq!(info["start_command"], "pf-cmd");
    }

    #[test]
    fn missing_web_is_reported_not_fatal() {
        let stage = Stage::new();
        stage.hook("bp", "detect", "echo Spider");
        stage.hook("bp", "compile", "exit 0");
        stage.hook(
            "bp",
            "release",
            "printf 'default_process_types:\\n  spider: bogus\\n'",
        );

        builder()
            .args(stage.args(&["bp"]))
            .assert()
            .success()
            .stderr(predicate::str::contains(
                "No start command specified by buildpack or via Procfile.",
            ));

        assert_eq!(
            stage.result()["process_types"],
            serde_json::json!({"spider": "bogus"})
        );
    }

    #[test]
    fn nothing_detected_exits_222() {
        let stage = Stage::new();
        stage.hook("bp", "detect", "exit 1");

        builder().args(stage.args(&["bp"])).assert().code(222);
    }

    #[test]
    fn compile_failure_exits_223() {
        let stage = Stage::new();
        stage.hook("bp", "detect", "echo Bp");
        stage.hook("bp", "compile", "echo 'compile broke' >&2; exit 1");

        builder()
            .args(stage.args(&["bp"]))
            .assert()
            .code(223)
            .stderr(predicate::str::contains("compile broke"));
    }

    #[test]
    fn release_garbage_exits_224() {
        let stage = Stage::new();
        stage.hook("bp", "detect", "echo Bp");
        stage.hook("bp", "compile", "exit 0");
        stage.hook("bp", "release", "echo 'default_process_types: [oops'");

        builder().args(stage.args(&["bp"])).assert().code(224);
    }

    #[test]
    fn all_supplies_failing_exits_225() {
        let stage = Stage::new();
        stage.hook("a", "supply", "exit 1");
        stage.hook("b", "compile", "exit 0");

        builder()
            .args(stage.args(&["a", "b"]))
            .arg("--skip-detect")
            .assert()
            .code(225);
    }

    #[test]
    fn stale_cache_entries_are_dropped() {
        let stage = Stage::new();
        std::fs::create_dir_all(stage.path("cache/final")).unwrap();
        std::fs::create_dir_all(stage.path("cache/0123456789abcdef")).unwrap();
        std::fs::write(stage.path("cache/old.tgz"), "x").unwrap();
        stage.hook("bp", "detect", "echo Bp");
        stage.hook("bp", "compile", "exit 0");

        builder().args(stage.args(&["bp"])).assert().success();

        let cache = members(&stage.cache_archive());
        assert!(cache.contains_key("./final/"));
        assert!(!cache.keys().any(|k| k.starts_with("./0123456789abcdef")));
        assert!(!cache.contains_key("./old.tgz"));
    }

    #[test]
    fn build_dir_neighbours_survive() {
        let stage = Stage::new();
        for dir in ["tmp", "logs", "deps"] {
            std::fs::create_dir_all(stage.path("contents").join(dir)).unwrap();
            std::fs::write(stage.path("contents").join(dir).join("keep"), dir).unwrap();
        }
        std::fs::create_dir_all(stage.path("scratch")).unwrap();
        stage.hook("bp", "detect", "echo Bp");
        stage.hook("bp", "compile", "exit 0");

        builder()
            .env("TMPDIR", stage.path("scratch"))
            .args(stage.args(&["bp"]))
            .assert()
            .success();

        for dir in ["tmp", "logs", "deps"] {
            let keep = stage.path("contents").join(dir).join("keep");
            assert_eq!(std::fs::read_to_string(keep).unwrap(), dir);
        }
        assert!(!stage.path("contents/staging_info.yml").exists());
        assert!(!stage.build_dir().exists());
        assert_eq!(std::fs::read_dir(stage.path("scratch")).unwrap().count(), 0);

        let droplet = members(&stage.droplet());
        assert!(!droplet.contains_key("./tmp/keep"));
        assert!(!droplet.contains_key("./deps/keep"));
    }
}

#[cfg(unix)]
mod launcher_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn launcher() -> Command {
        let mut cmd = cargo_bin_cmd!("launcher");
        cmd.env_remove("VCAP_SERVICES")
            .env_remove("VCAP_APPLICATION")
            .env_remove("RUST_LOG");
        cmd
    }

    fn droplet() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        fs::create_dir_all(&app).unwrap();
        (temp, app)
    }

    #[test]
    fn too_few_arguments_exit_1() {
        launcher().args(["/app", "run"]).assert().code(1);
    }

    #[test]
    fn no_start_command_exit_1() {
        let (_temp, app) = droplet();
        launcher()
            .args([app.to_str().unwrap(), "", "{}"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains(
                "no start command specified or detected in droplet",
            ));
    }

    #[test]
    fn unreadable_staging_info_exit_1() {
        let (temp, app) = droplet();
        fs::write(temp.path().join("staging_info.yml"), [0xff, 0xfe, 0xfd]).unwrap();
        launcher()
            .args([app.to_str().unwrap(), "", "{}"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("staging_info.yml"));
    }

    #[test]
    fn runs_start_command_with_environment() {
        let (temp, app) = droplet();
        fs::create_dir_all(temp.path().join("profile.d")).unwrap();
        fs::write(temp.path().join("profile.d/a.sh"), "export ORDER=global").unwrap();
        fs::create_dir_all(app.join(".profile.d")).unwrap();
        fs::write(app.join(".profile.d/a.sh"), "export ORDER=\"$ORDER,local\"").unwrap();
        fs::write(app.join(".profile"), "export ORDER=\"$ORDER,profile\"").unwrap();

        launcher()
            .args([
                app.to_str().unwrap(),
                "echo \"order=$ORDER home=$HOME deps=$DEPS_DIR opts=${VCAP_PLATFORM_OPTIONS:-unset}\"",
                "{}",
            ])
            .env("VCAP_PLATFORM_OPTIONS", "{}")
            .assert()
            .success()
            .stdout(predicate::str::contains("Invoking pre-start scripts."))
            .stdout(predicate::str::contains("Invoking start command."))
            .stdout(predicate::str::contains("order=global,local,profile"))
            .stdout(predicate::str::contains("/deps opts=unset"));
    }

    #[test]
    fn start_command_from_staging_info() {
        let (temp, app) = droplet();
        fs::write(
            temp.path().join("staging_info.yml"),
            r#"{"detected_buildpack":"","start_command":"echo from-staging-info"}"#,
        )
        .unwrap();

        launcher()
            .args([app.to_str().unwrap(), "", "{}"])
            .assert()
            .success()
            .stdout(predicate::str::contains("from-staging-info"));
    }

    #[test]
    fn vcap_application_is_extended() {
        let (_temp, app) = droplet();
        launcher()
            .args([app.to_str().unwrap(), "echo \"$VCAP_APPLICATION\"", "{}"])
            .env("VCAP_APPLICATION", r#"{"name":"demo"}"#)
            .env("PORT", "8080")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"host\":\"0.0.0.0\""))
            .stdout(predicate::str::contains("\"port\":8080"))
            .stdout(predicate::str::contains("\"name\":\"demo\""));
    }

    #[test]
    fn invalid_vcap_application_exit_3() {
        let (_temp, app) = droplet();
        launcher()
            .args([app.to_str().unwrap(), "true", "{}"])
            .env("VCAP_APPLICATION", "{broken")
            .assert()
            .code(3);
    }

    #[test]
    fn secret_reference_without_identity_exit_3() {
        let (_temp, app) = droplet();
        launcher()
            .args([app.to_str().unwrap(), "true", "{}"])
            .env(
                "VCAP_SERVICES",
                r#"{"my-server":[{"credentials":{"credhub-ref":"(//x/y)"}}]}"#,
            )
            .env("VCAP_PLATFORM_OPTIONS", r#"{"credhub-uri":"https://127.0.0.1:1"}"#)
            .env_remove("CF_INSTANCE_CERT")
            .assert()
            .code(3);
    }

    #[test]
    fn missing_entrypoint_prefix_exit_127() {
        let (temp, app) = droplet();
        fs::write(
            temp.path().join("staging_info.yml"),
            r#"{"start_command":"true","config":{"entrypoint_prefix":"/no/such/entrypoint"}}"#,
        )
        .unwrap();

        launcher()
            .args([app.to_str().unwrap(), "", "{}"])
            .assert()
            .code(127);
    }
}
