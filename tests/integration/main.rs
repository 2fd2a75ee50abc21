//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    /// A kiln command isolated from the user's config and environment
    fn kiln(temp: &TempDir) -> Command {
        let config = temp.path().join("config.toml");
        if !config.exists() {
            fs::write(&config, "").unwrap();
        }
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.env("KILN_CONFIG", &config)
            .env("KILN_CACHE_DIR", temp.path().join("cache"))
            .env_remove("http_proxy")
            .env_remove("HTTP_PROXY");
        cmd
    }

    /// Accept one connection per responder, each answered on its own
    /// thread with the body the responder builds from the request headers
    fn serve<F>(responders: Vec<F>) -> String
    where
        F: FnOnce(&[String]) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            for respond in responders {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                thread::spawn(move || {
                    let mut reader = BufReader::new(stream.try_clone().unwrap());
                    let mut headers = Vec::new();
                    let mut line = String::new();
                    while reader.read_line(&mut line).unwrap() > 0 {
                        if line == "\r\n" {
                            break;
                        }
                        headers.push(line.trim_end().to_string());
                        line.clear();
                    }
                    let body = respond(&headers);
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(head.as_bytes()).unwrap();
                    let _ = stream.write_all(&body);
                });
            }
        });

        format!("http://{}", addr)
    }

    /// Answer a single HTTP request with `body`, then stop listening
    fn serve_once(body: &'static str) -> String {
        serve(vec![move |_: &[String]| body.as_bytes().to_vec()])
    }

    /// Answer a single request with whether it carried credentials
    fn serve_auth_echo() -> String {
        serve(vec![|headers: &[String]| {
            let authorized = headers
                .iter()
                .any(|h| h.to_ascii_lowercase().starts_with("authorization:"));
            let body = if authorized { "authorized" } else { "anonymous" };
            body.as_bytes().to_vec()
        }])
    }

    /// `App` (with lock file) referencing its sibling `Lib`
    fn workspace(temp: &TempDir, packages: &str) -> std::path::PathBuf {
        let app = temp.path().join("src").join("App");
        let lib = temp.path().join("src").join("Lib");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&lib).unwrap();
        fs::write(app.join("project.json"), r#"{"name": "App"}"#).unwrap();
        fs::write(lib.join("project.json"), r#"{"version": "3.1.0"}"#).unwrap();
        fs::write(
            app.join("project.lock.json"),
            format!(
                r#"{{
                    "version": 2,
                    "libraries": [{}],
                    "projects": [{{"name": "Lib", "path": "../Lib/project.json"}}]
                }}"#,
                packages
            ),
        )
        .unwrap();
        app
    }

    fn write_config(temp: &TempDir, feed: &str) {
        fs::write(
            temp.path().join("config.toml"),
            format!("[[sources]]\nname = \"local\"\nurl = \"{}\"\n", feed),
        )
        .unwrap();
    }

    fn write_source_with_credentials(temp: &TempDir, url: &str) {
        fs::write(
            temp.path().join("config.toml"),
            format!(
                "[[sources]]\nname = \"private\"\nurl = \"{}\"\nusername = \"ci\"\npassword = \"secret\"\n",
                url
            ),
        )
        .unwrap();
    }

    fn arg(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("lock-file restore engine"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn cache_path_honours_override() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        kiln(&temp)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached entries"));
    }

    #[test]
    fn resolve_sibling_project() {
        let temp = TempDir::new().unwrap();
        let app = workspace(&temp, "");

        kiln(&temp)
            .args(["resolve", "Lib", "--project", arg(&app)])
            .assert()
            .success()
            .stdout(predicate::str::contains("Lib").and(predicate::str::contains("3.1.0")));
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let temp = TempDir::new().unwrap();
        let app = workspace(&temp, "");

        kiln(&temp)
            .args(["resolve", "Newtonsoft.Json", "--project", arg(&app)])
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not a project reference"));
    }

    #[test]
    fn resolve_without_lock_file_hints() {
        let temp = TempDir::new().unwrap();

        kiln(&temp)
            .args(["resolve", "Lib", "--project", arg(temp.path())])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Lock file not found"));
    }

    #[test]
    fn restore_without_source_fails() {
        let temp = TempDir::new().unwrap();
        let app = workspace(&temp, "");

        kiln(&temp)
            .args(["restore", "--project", arg(&app)])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn restore_fetches_packages() {
        let temp = TempDir::new().unwrap();
        let feed = serve_once("archive bytes");
        write_config(&temp, &feed);
        let app = workspace(&temp, r#"{"name": "pkgA", "version": "1.0.0"}"#);

        kiln(&temp)
            .args(["restore", "--project", arg(&app)])
            .assert()
            .success()
            .stdout(predicate::str::contains("pkgA/1.0.0"));

        kiln(&temp)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pkgA-1.0.0.dat"));
    }

    #[test]
    fn fetch_second_time_is_served_from_cache() {
        let temp = TempDir::new().unwrap();
        let feed = serve_once("hello from the feed");
        let uri = format!("{}/pkgA/1.0/pkgA.1.0.nupkg", feed);

        kiln(&temp)
            .args(["fetch", &uri, "--key", "pkgA-1.0"])
            .assert()
            .success()
            .stdout("hello from the feed");

        // The server is gone; only the cache can answer
        kiln(&temp)
            .args(["fetch", &uri, "--key", "pkgA-1.0"])
            .assert()
            .success()
            .stdout("hello from the feed");
    }

    #[test]
    fn fetch_with_zero_max_age_bypasses_cache() {
        let temp = TempDir::new().unwrap();
        let feed = serve_once("fresh");
        let uri = format!("{}/pkgA/1.0/pkgA.1.0.nupkg", feed);

        kiln(&temp)
            .args(["fetch", &uri, "--key", "pkgA-1.0", "--max-age", "0"])
            .assert()
            .success()
            .stdout("fresh");

        kiln(&temp)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached entries"));
    }

    #[test]
    fn fetch_sends_credentials_to_owning_source() {
        let temp = TempDir::new().unwrap();
        let feed = serve_auth_echo();
        write_source_with_credentials(&temp, &feed);

        kiln(&temp)
            .args(["fetch", &format!("{}/pkgA/1.0/pkgA.1.0.nupkg", feed)])
            .args(["--key", "pkgA-1.0", "--max-age", "0"])
            .assert()
            .success()
            .stdout("authorized");
    }

    #[test]
    fn fetch_withholds_credentials_from_port_sharing_a_prefix() {
        let temp = TempDir::new().unwrap();
        let feed = serve_auth_echo();
        // http://127.0.0.1:38993 -> http://127.0.0.1:3899
        write_source_with_credentials(&temp, &feed[..feed.len() - 1]);

        kiln(&temp)
            .args(["fetch", &format!("{}/pkgA/1.0/pkgA.1.0.nupkg", feed)])
            .args(["--key", "pkgA-1.0", "--max-age", "0"])
            .assert()
            .success()
            .stdout("anonymous");
    }

    #[test]
    fn concurrent_fetches_share_one_complete_payload() {
        let temp = TempDir::new().unwrap();
        let payload_a = vec![b'A'; 512 * 1024];
        let payload_b = vec![b'B'; 512 * 1024];
        let bodies = [payload_a.clone(), payload_b.clone()];
        let feed = serve(
            bodies
                .into_iter()
                .map(|body| move |_: &[String]| body)
                .collect(),
        );
        let uri = format!("{}/pkgA/1.0/pkgA.1.0.nupkg", feed);

        let outputs: Vec<_> = thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| {
                    let mut cmd = kiln(&temp);
                    cmd.args(["fetch", &uri, "--key", "pkgA-1.0"]);
                    scope.spawn(move || cmd.output().unwrap())
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        for output in &outputs {
            assert!(output.status.success());
            assert!(
                output.stdout == payload_a || output.stdout == payload_b,
                "torn payload of {} bytes",
                output.stdout.len()
            );
        }

        let resident = kiln::http::cache::cache_file_path(
            &temp.path().join("cache"),
            &format!("{}/pkgA/1.0/", feed),
            "pkgA-1.0",
        );
        let content = fs::read(resident).unwrap();
        assert!(content == payload_a || content == payload_b);
    }
}
