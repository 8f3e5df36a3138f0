use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;
use std::thread::JoinHandle;

fn parley(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_parley"));
    cmd.current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_API_ORG")
        .env_remove("GITHUB_EVENT_NAME")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn tokens_counts_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "hello world").unwrap();

    let output = parley(dir.path())
        .args(["tokens", "--file"])
        .arg(&input)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 tokens"), "unexpected output: {stdout}");
    assert!(stdout.contains("fits in request budget"));
}

#[test]
fn tokens_json_reports_budget() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "").unwrap();

    let output = parley(dir.path())
        .args(["--format", "json", "tokens", "--model", "gpt-4-32k", "--file"])
        .arg(&input)
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["tokens"], 0);
    assert_eq!(json["requestTokens"], 28500);
    assert_eq!(json["fits"], true);
}

#[test]
fn render_substitutes_known_fields() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.txt");
    std::fs::write(&template, "Title: $title, Diff: $diff, Patches: $patches").unwrap();

    let output = parley(dir.path())
        .args(["render", "--title", "Fix bug", "--template"])
        .arg(&template)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Title: Fix bug, Diff: no diff, Patches: $patches"
    );
}

#[test]
fn route_maps_event_to_flow() {
    let dir = tempfile::tempdir().unwrap();

    let output = parley(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .args(["route", "pull_request_review_comment"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "pull_request_review_comment -> review_comment"
    );
}

#[test]
fn route_skips_without_api_key() {
    let dir = tempfile::tempdir().unwrap();

    let output = parley(dir.path())
        .args(["route", "pull_request"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Skipped"));
}

#[test]
fn chat_without_api_key_fails_fast() {
    let dir = tempfile::tempdir().unwrap();

    let output = parley(dir.path())
        .args(["chat", "hello"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OPENAI_API_KEY"));
}

/// Serve one canned completion per connection, always with the same
/// completion id, and hand back the request bodies once all are served.
fn stub_backend(replies: Vec<&'static str>) -> (String, JoinHandle<Vec<serde_json::Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let mut bodies = Vec::new();
        for reply in replies {
            let (mut socket, _) = listener.accept().unwrap();
            bodies.push(read_body(&mut socket));
            let body = serde_json::json!({
                "id": "chatcmpl-fixed",
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).unwrap();
        }
        bodies
    });
    (base_url, handle)
}

fn read_body(socket: &mut std::net::TcpStream) -> serde_json::Value {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse().unwrap())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).unwrap();
        assert!(n > 0, "client closed before sending the body");
        buf.extend_from_slice(&chunk[..n]);
    }
    serde_json::from_slice(&buf[head_end..head_end + length]).unwrap()
}

fn write_config(dir: &Path, base_url: &str, history: bool) -> std::path::PathBuf {
    let mut config = format!(
        "[bot]\nbase_url = \"{base_url}\"\nretries = 1\ntimeout_ms = 10000\nsystem_message = \"sys\"\n"
    );
    if history {
        config.push_str("history_file = \"history.json\"\n");
    }
    let path = dir.join("parley.toml");
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn chat_thread_continues_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, backend) = stub_backend(vec!["answer one", "answer two"]);
    let config = write_config(dir.path(), &base_url, true);

    let first = parley(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .args(["chat", "first question"])
        .output()
        .unwrap();
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let replies: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(replies[0]["text"], "answer one");
    let parent = replies[0]["ids"]["parentMessageId"].as_str().unwrap().to_string();
    assert_ne!(parent, "chatcmpl-fixed");
    assert!(dir.path().join("history.json").exists());

    let second = parley(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .args(["chat", "--parent-message-id", &parent, "second question"])
        .output()
        .unwrap();
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));
    let replies: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert_eq!(replies[0]["text"], "answer two");

    let bodies = backend.join().unwrap();
    let contents: Vec<&str> = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents.len(), 4);
    assert!(contents[0].starts_with("sys"));
    assert_eq!(&contents[1..], ["first question", "answer one", "second question"]);
}

#[test]
fn chat_warns_when_parent_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, backend) = stub_backend(vec!["fresh start"]);
    let config = write_config(dir.path(), &base_url, true);

    let output = parley(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .arg("--config")
        .arg(&config)
        .args(["chat", "--parent-message-id", "no-such-message", "hello"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fresh start"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parent message not in history"), "{stderr}");
    let bodies = backend.join().unwrap();
    assert_eq!(bodies[0]["messages"].as_array().unwrap().len(), 2);
}

#[test]
fn chat_warns_when_no_history_file_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, backend) = stub_backend(vec!["ok"]);
    let config = write_config(dir.path(), &base_url, false);

    let output = parley(dir.path())
        .env("OPENAI_API_KEY", "sk-test")
        .arg("--config")
        .arg(&config)
        .args(["chat", "--parent-message-id", "earlier", "hello"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no history file configured"), "{stderr}");
    backend.join().unwrap();
}

#[test]
fn render_builtin_review_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let patches = dir.path().join("patches.txt");
    std::fs::write(&patches, "---new_hunk---\n12: +retry()").unwrap();

    let output = parley(dir.path())
        .args(["render", "--prompt", "review", "--title", "Add retries"])
        .args(["--filename", "src/bot.rs", "--patches"])
        .arg(&patches)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("`Add retries`"));
    assert!(stdout.contains("## File `src/bot.rs`"));
    assert!(stdout.contains("12: +retry()"));
}

#[test]
fn render_configured_summarize_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("parley.toml");
    std::fs::write(&config, "[prompts]\nsummarize = \"Summary of $title: $raw_summary\"\n").unwrap();

    let output = parley(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["render", "--prompt", "summarize", "--title", "Fix bug"])
        .args(["--raw-summary", "src/lib.rs: null check"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Summary of Fix bug: src/lib.rs: null check"
    );
}

#[test]
fn render_needs_template_or_prompt() {
    let dir = tempfile::tempdir().unwrap();

    let output = parley(dir.path()).arg("render").output().unwrap();

    assert!(!output.status.success());
}
