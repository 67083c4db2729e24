use std::env;
use std::sync::{Mutex, OnceLock};

use loanbot_cli::commands::{doctor, intake, migrate};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("LOANBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_bad_database_url() {
    with_env(&[("LOANBOT_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_json_reports_all_checks_passing() {
    with_env(
        &[
            ("LOANBOT_DATABASE_URL", "sqlite::memory:"),
            ("LOANBOT_LLM_PROVIDER", "rule_based"),
        ],
        || {
            let payload = parse_payload(&doctor::run(true));
            assert_eq!(payload["overall_status"], "pass");

            let checks = payload["checks"].as_array().expect("checks array");
            assert_eq!(checks.len(), 3);
            assert!(checks.iter().all(|check| check["status"] == "pass"));
        },
    );
}

#[test]
fn doctor_json_fails_when_config_is_invalid() {
    with_env(&[("LOANBOT_LLM_PROVIDER", "openai")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert_eq!(checks[1]["status"], "skipped");
    });
}

#[test]
fn intake_completes_from_a_multi_line_message() {
    with_env(&[], || {
        let text = "Alex Chen\nalex@example.com\n$1,200.50\ncar repair";
        let result = intake::run(Some(text), 6);
        assert_eq!(result.exit_code, 0, "expected completed intake run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["completed"], true);
        assert_eq!(payload["collected"]["applicant_name"], "Alex Chen");
        assert_eq!(payload["loan_amount"], 1200.5);
        assert_eq!(payload["turns"].as_array().map(Vec::len), Some(4));
    });
}

#[test]
fn intake_reports_pending_fields_when_input_runs_out() {
    with_env(&[], || {
        let result = intake::run(Some("Alex Chen"), 6);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["completed"], false);
        let turns = payload["turns"].as_array().expect("turns array");
        let last = turns.last().expect("at least one turn");
        assert_eq!(last["pending_fields"][0], "applicant_email");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LOANBOT_DATABASE_URL",
        "LOANBOT_DATABASE_MAX_CONNECTIONS",
        "LOANBOT_DATABASE_TIMEOUT_SECS",
        "LOANBOT_LLM_PROVIDER",
        "LOANBOT_LLM_API_KEY",
        "LOANBOT_LLM_BASE_URL",
        "LOANBOT_LLM_MODEL",
        "LOANBOT_LLM_TIMEOUT_SECS",
        "LOANBOT_SERVER_BIND_ADDRESS",
        "LOANBOT_SERVER_PORT",
        "LOANBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LOANBOT_LOGGING_LEVEL",
        "LOANBOT_LOGGING_FORMAT",
        "LOANBOT_LOG_LEVEL",
        "LOANBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, previous) in previous_values {
        match previous {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
