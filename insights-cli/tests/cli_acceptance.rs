use chrono::{DateTime, TimeZone, Utc};
use insights_core::db::{Channel, Database, Post, Reaction, Team, User};
use insights_core::timezone::UserTimezone;
use insights_core::ChannelType;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const NOW: &str = "2024-05-10T15:30:00Z";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        let env = Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        };
        seed_workspace(&env.db_path());
        env
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("insights/activity.db")
    }

    fn write_config(&self, content: &str) {
        let path = self.xdg_config.join("insights/config.toml");
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config directory");
        fs::write(path, content).expect("failed to write config");
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap()
}

fn post(id: &str, channel_id: &str, user_id: &str, root: Option<&str>, h: u32) -> Post {
    Post {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        user_id: user_id.to_string(),
        root_id: root.map(str::to_string),
        message: format!("message {id}"),
        created_at: at(h, 0),
        deleted_at: None,
    }
}

/// Two open channels in team1: chana with 3 posts today, chanb with 1.
fn seed_workspace(db_path: &Path) {
    let db = Database::open(db_path).expect("failed to open db");
    db.migrate().expect("failed to migrate db");

    db.upsert_team(&Team {
        id: "team1".to_string(),
        name: "core".to_string(),
        display_name: "Core".to_string(),
    })
    .unwrap();

    let mut alice = User::new("alice", "alice");
    alice.timezone = UserTimezone::manual("Asia/Kolkata");
    db.upsert_user(&alice).unwrap();
    db.upsert_user(&User::new("bob", "bob")).unwrap();

    db.add_team_member("team1", "alice", Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap())
        .unwrap();
    db.add_team_member("team1", "bob", at(12, 0)).unwrap();

    for id in ["chana", "chanb"] {
        db.upsert_channel(&Channel {
            id: id.to_string(),
            team_id: Some("team1".to_string()),
            name: id.to_string(),
            display_name: id.to_uppercase(),
            channel_type: ChannelType::Open,
            deleted_at: None,
        })
        .unwrap();
    }
    db.add_channel_member("chana", "alice").unwrap();
    db.add_channel_member("chana", "bob").unwrap();
    db.add_channel_member("chanb", "bob").unwrap();

    db.insert_posts(&[
        post("a1", "chana", "alice", None, 1),
        post("a2", "chana", "bob", Some("a1"), 2),
        post("a3", "chana", "alice", None, 9),
        post("b1", "chanb", "bob", None, 4),
    ])
    .unwrap();

    for (user, emoji) in [("bob", "tada"), ("alice", "tada"), ("bob", "smile")] {
        db.insert_reaction(&Reaction {
            user_id: user.to_string(),
            post_id: "a1".to_string(),
            emoji_name: emoji.to_string(),
            created_at: at(5, 0),
            deleted_at: None,
        })
        .unwrap();
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("insights"));

    Command::new(bin_path)
        .args(["--now", NOW])
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute insights: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "insights {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        output.status,
        stdout,
        stderr
    );
}

fn run_json(env: &CliTestEnv, args: &[&str]) -> Value {
    let output = run_bin(env, args);
    assert_success(args, &output);
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn run_rejected(env: &CliTestEnv, args: &[&str]) -> (i32, Value) {
    let output = run_bin(env, args);
    let code = output.status.code().expect("process exited by signal");
    let body = serde_json::from_slice(&output.stderr).unwrap_or_else(|e| {
        panic!(
            "stderr should be an error object ({e}):\n{}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (code, body)
}

fn ids(value: &Value, field: &str) -> Vec<String> {
    value["items"]
        .as_array()
        .expect("items should be an array")
        .iter()
        .map(|item| item[field].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn channels_ranks_team_channels_with_hourly_series() {
    let env = CliTestEnv::new();
    let args = ["channels", "--team", "team1", "--timezone", "UTC"];
    let json = run_json(&env, &args);

    assert_eq!(ids(&json, "id"), vec!["chana", "chanb"]);
    assert_eq!(json["items"][0]["message_count"], 3);
    assert_eq!(json["items"][0]["type"], "open");
    assert_eq!(json["has_next"], false);

    let series = &json["post_count_by_duration"];
    let chana = series["chana"].as_array().unwrap();
    assert_eq!(chana.len(), 16, "00:00 through 15:00 UTC");
    assert_eq!(chana[0]["bucket_start"], "2024-05-10T00:00:00Z");
    assert_eq!(chana[1]["count"], 1);
    let total: i64 = chana.iter().map(|b| b["count"].as_i64().unwrap()).sum();
    assert_eq!(total, 3);
    assert_eq!(series["chanb"].as_array().unwrap().len(), 16);
}

#[test]
fn channels_page_only_carries_series_for_its_channels() {
    let env = CliTestEnv::new();
    let args = [
        "channels", "--team", "team1", "--timezone", "UTC", "--page", "1", "--per-page", "1",
    ];
    let json = run_json(&env, &args);

    assert_eq!(ids(&json, "id"), vec!["chanb"]);
    assert_eq!(json["has_next"], false);
    let series = json["post_count_by_duration"].as_object().unwrap();
    assert_eq!(series.keys().collect::<Vec<_>>(), vec!["chanb"]);
}

#[test]
fn user_scope_uses_the_stored_timezone_preference() {
    let env = CliTestEnv::new();
    let args = ["channels", "--user", "alice"];
    let json = run_json(&env, &args);

    assert_eq!(ids(&json, "id"), vec!["chana"]);
    assert_eq!(json["items"][0]["message_count"], 2);

    // Midnight in Kolkata is 18:30 UTC the day before; now is 21:00 local.
    let chana = json["post_count_by_duration"]["chana"].as_array().unwrap();
    assert_eq!(chana[0]["bucket_start"], "2024-05-09T18:30:00Z");
    assert_eq!(chana.len(), 22);
}

#[test]
fn reactions_and_threads_for_team() {
    let env = CliTestEnv::new();

    let reactions = run_json(&env, &["reactions", "--team", "team1", "--range", "7_day"]);
    assert_eq!(ids(&reactions, "emoji_name"), vec!["tada", "smile"]);
    assert_eq!(reactions["items"][0]["count"], 2);

    let threads = run_json(&env, &["threads", "--team", "team1", "--range", "all_time"]);
    assert_eq!(ids(&threads, "post_id"), vec!["a1"]);
    assert_eq!(threads["items"][0]["reply_count"], 1);
    assert_eq!(threads["items"][0]["participants"][0], "bob");
}

#[test]
fn members_lists_recent_joins_with_total() {
    let env = CliTestEnv::new();
    let json = run_json(&env, &["members", "--team", "team1", "--range", "7_day"]);

    assert_eq!(ids(&json, "id"), vec!["bob"]);
    assert_eq!(json["total_count"], 1);
    assert_eq!(json["items"][0]["joined_at"], "2024-05-10T12:00:00Z");
}

#[test]
fn configured_default_page_size_applies() {
    let env = CliTestEnv::new();
    env.write_config("[paging]\ndefault_per_page = 1\nmax_per_page = 5\n");

    let json = run_json(&env, &["reactions", "--team", "team1"]);
    assert_eq!(ids(&json, "emoji_name"), vec!["tada"]);
    assert_eq!(json["has_next"], true);
}

#[test]
fn repeated_runs_print_identical_output() {
    let env = CliTestEnv::new();
    let args = ["channels", "--team", "team1", "--range", "28_day", "--pretty"];

    let first = run_bin(&env, &args);
    let second = run_bin(&env, &args);
    assert_success(&args, &first);
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn unknown_range_is_rejected() {
    let env = CliTestEnv::new();
    let (code, body) = run_rejected(&env, &["channels", "--team", "team1", "--range", "yesterday"]);

    assert_eq!(code, 4);
    assert_eq!(body["kind"], "invalid_range");
    assert_eq!(body["status"], 400);
}

#[test]
fn malformed_scope_is_rejected() {
    let env = CliTestEnv::new();
    let (code, body) = run_rejected(&env, &["threads", "--team", "Team 1"]);

    assert_eq!(code, 4);
    assert_eq!(body["kind"], "invalid_scope");
    assert_eq!(body["status"], 403);
}

#[test]
fn rejected_query_is_written_to_the_log_file() {
    let env = CliTestEnv::new();
    let (code, _) = run_rejected(&env, &["channels", "--team", "team1", "--range", "yesterday"]);
    assert_eq!(code, 4);

    let log_dir = env.xdg_state.join("insights");
    let logs: String = fs::read_dir(&log_dir)
        .unwrap_or_else(|e| panic!("missing log dir {}: {e}", log_dir.display()))
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("insights.log"))
        })
        .map(|path| fs::read_to_string(path).unwrap())
        .collect();

    assert!(logs.contains("Query failed"), "log contents:\n{logs}");
    assert!(logs.contains("invalid_range"), "log contents:\n{logs}");
}

#[test]
fn zero_page_size_is_rejected() {
    let env = CliTestEnv::new();
    let (code, body) = run_rejected(&env, &["reactions", "--team", "team1", "--per-page", "0"]);

    assert_eq!(code, 4);
    assert_eq!(body["kind"], "invalid_pagination");
}

#[test]
fn missing_config_file_is_a_setup_failure() {
    let env = CliTestEnv::new();
    let output = run_bin(
        &env,
        &["--config", "/nonexistent/insights.toml", "reactions", "--team", "team1"],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "{stderr}");
}
