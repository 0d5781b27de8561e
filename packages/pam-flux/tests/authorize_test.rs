//! Verdicts, denial notices and audit lines from the account hook driver.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use flux_client::testing::MockBroker;
use flux_client::{CONFIG_GET_TOPIC, JOB_LIST_TOPIC};
use pam_flux::{
    Authorizer, Conversation, PamFluxError, UserDirectory, Verdict, OWNER_ATTR,
};
use serde_json::json;

/// Fixed name to uid table.
struct StaticUsers(HashMap<&'static str, u32>);

impl StaticUsers {
    fn new() -> Self {
        Self(HashMap::from([("alice", 1000), ("bob", 1001), ("flux", 500)]))
    }
}

impl UserDirectory for StaticUsers {
    fn uid_for(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }
}

/// Records messages sent to the user.
#[derive(Default)]
struct RecordingConversation {
    messages: Vec<String>,
    fail: bool,
}

impl Conversation for RecordingConversation {
    fn error_message(&mut self, message: &str) -> pam_flux::Result<()> {
        self.messages.push(message.to_string());
        if self.fail {
            return Err(PamFluxError::Conversation("Conversation error".into()));
        }
        Ok(())
    }
}

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}

fn authorize(
    broker: &MockBroker,
    user: Option<&str>,
    args: &[&str],
    conv: &mut RecordingConversation,
) -> Verdict {
    let users = StaticUsers::new();
    Authorizer::new(broker, &users).authorize(user, args, conv)
}

fn alice_on_rank_zero() -> MockBroker {
    MockBroker::new()
        .with_rank(0)
        .with_job(json!({"userid": 1000, "ranks": "0-3", "state": 16}))
}

#[test]
fn test_granted_without_notice() {
    let broker = alice_on_rank_zero();
    let mut conv = RecordingConversation::default();

    let (verdict, logs) = with_logs(|| authorize(&broker, Some("alice"), &[], &mut conv));

    assert_eq!(verdict, Verdict::Granted);
    assert_eq!(verdict.pam_code(), 0);
    assert!(conv.messages.is_empty());
    assert!(logs.contains("access granted for user alice (uid=1000)"), "{logs}");
}

#[test]
fn test_denied_sends_notice_and_audit_line() {
    let broker = alice_on_rank_zero();
    let mut conv = RecordingConversation::default();

    let (verdict, logs) = with_logs(|| authorize(&broker, Some("bob"), &[], &mut conv));

    assert_eq!(verdict, Verdict::Denied);
    assert_eq!(verdict.pam_code(), 6);
    assert_eq!(
        conv.messages,
        vec!["Access denied: user bob has no active jobs on this node".to_string()]
    );
    assert!(logs.contains("access denied for user bob (uid=1001)"), "{logs}");
}

#[test]
fn test_conversation_failure_still_denies() {
    let broker = alice_on_rank_zero();
    let mut conv = RecordingConversation {
        fail: true,
        ..Default::default()
    };

    let (verdict, logs) = with_logs(|| authorize(&broker, Some("bob"), &[], &mut conv));

    assert_eq!(verdict, Verdict::Denied);
    assert!(logs.contains("unable to converse with app"), "{logs}");
    assert!(logs.contains("access denied for user bob (uid=1001)"), "{logs}");
}

#[test]
fn test_unknown_user_is_distinct_from_denied() {
    let broker = alice_on_rank_zero();

    for user in [Some("mallory"), Some(""), None] {
        let mut conv = RecordingConversation::default();
        let verdict = authorize(&broker, user, &[], &mut conv);

        assert_eq!(verdict, Verdict::UnknownIdentity);
        assert_eq!(verdict.pam_code(), 10);
        assert!(conv.messages.is_empty());
    }
    // no broker traffic for unresolvable users
    assert_eq!(broker.open_count(), 0);
}

#[test]
fn test_bad_option_is_system_error() {
    let broker = alice_on_rank_zero();
    let mut conv = RecordingConversation::default();

    let (verdict, logs) = with_logs(|| {
        authorize(&broker, Some("alice"), &["allow-guest-user", "nope"], &mut conv)
    });

    assert_eq!(verdict, Verdict::SystemError);
    assert_eq!(verdict.pam_code(), 4);
    assert!(conv.messages.is_empty());
    assert!(logs.contains("unrecognized option: nope"), "{logs}");
    assert_eq!(broker.open_count(), 0);
}

#[test]
fn test_broker_down_denies_every_user() {
    let broker = MockBroker::new();

    for user in ["alice", "bob", "flux"] {
        let mut conv = RecordingConversation::default();
        let (verdict, logs) = with_logs(|| {
            authorize(&broker, Some(user), &["allow-guest-user"], &mut conv)
        });
        assert_eq!(verdict, Verdict::Denied);
        assert_eq!(conv.messages.len(), 1);
        assert!(logs.contains("Unable to connect to Flux"), "{logs}");
    }
}

#[test]
fn test_guest_grant_through_driver() {
    let broker = MockBroker::new()
        .with_rank(2)
        .with_attr(OWNER_ATTR, "500")
        .with_job(json!({
            "userid": 500,
            "ranks": "2-9",
            "state": 16,
            "annotations": {"user": {"uri": "ssh://node2/tmp/flux-Zx1/local-0"}}
        }))
        .with_child_config(
            "local:///tmp/flux-Zx1/local-0",
            json!({"access": {"allow-guest-user": true}}),
        );
    let mut conv = RecordingConversation::default();

    let verdict = authorize(&broker, Some("bob"), &["allow-guest-user"], &mut conv);
    assert_eq!(verdict, Verdict::Granted);
    assert_eq!(broker.rpc_count(JOB_LIST_TOPIC), 1);
    assert_eq!(broker.rpc_count(CONFIG_GET_TOPIC), 1);
    assert_eq!(broker.open_count(), broker.close_count());

    // same setup, guest access not enabled in the module arguments
    broker.clear_calls();
    let verdict = authorize(&broker, Some("bob"), &[], &mut conv);
    assert_eq!(verdict, Verdict::Denied);
    assert_eq!(broker.rpc_count(CONFIG_GET_TOPIC), 0);
}

#[test]
fn test_errors_logged_at_error_level() {
    let broker = MockBroker::new()
        .with_rank(0)
        .with_failing_topic(JOB_LIST_TOPIC);
    let mut conv = RecordingConversation::default();

    let (verdict, logs) = with_logs(|| authorize(&broker, Some("alice"), &[], &mut conv));

    assert_eq!(verdict, Verdict::Denied);
    let line = logs
        .lines()
        .find(|l| l.contains("flux_job_list failed"))
        .expect("job list failure logged");
    assert!(line.contains("ERROR"), "{line}");
}
