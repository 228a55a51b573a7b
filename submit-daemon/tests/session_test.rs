//! Integration tests for daemon sessions
//!
//! A daemon is bound to a socket in a temporary directory and driven by a
//! hand-written frontend, packet by packet.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::unreachable
)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use submit_auth::Authenticate;
use submit_channel::{Channel, ChannelError, Packet};
use submit_common::{Config, ConfigError, Message, Method, UserError};
use submit_daemon::{Daemon, DaemonContext, DaemonError};
use submit_delivery::{Deliverer, DelivererFactory, DeliveryError};
use tempfile::TempDir;
use tokio::{net::UnixStream, task::JoinHandle};

const PASSWORD: &str = "letmein";

type Calls = Arc<Mutex<Vec<String>>>;

/// Accepts [`PASSWORD`] within three attempts; `broken` fails every delivery
struct MockDeliverer {
    method: String,
    calls: Calls,
}

impl MockDeliverer {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Deliverer for MockDeliverer {
    fn method(&self) -> &str {
        &self.method
    }

    fn needs_authentication(&self) -> bool {
        true
    }

    async fn authenticate(&mut self, auth: &mut dyn Authenticate) -> Result<(), DeliveryError> {
        self.record(format!("authenticate {}", self.method));
        for _ in 0..3 {
            if auth.get_password("password", "Password:").await?.as_str() == PASSWORD {
                return Ok(());
            }
            auth.remove_password("password").await;
        }
        Err(UserError::authentication("Login failed.").into())
    }

    async fn deliver(&mut self, _message: &Message, recipients: &[String]) -> Result<(), DeliveryError> {
        self.record(format!("deliver {} {}", self.method, recipients.join(",")));
        if self.method == "broken" {
            return Err(DeliveryError::Internal("disk on fire".to_string()));
        }
        Ok(())
    }

    async fn abort(&mut self) {
        self.record(format!("abort {}", self.method));
    }
}

#[derive(Default)]
struct MockFactory {
    calls: Calls,
}

impl DelivererFactory for MockFactory {
    fn create(&self, _config: &Config, method: &str) -> Result<Box<dyn Deliverer>, ConfigError> {
        Ok(Box::new(MockDeliverer {
            method: method.to_string(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct TestDaemon {
    _dir: TempDir,
    path: PathBuf,
    calls: Calls,
    context: Arc<DaemonContext>,
    handle: JoinHandle<Result<(), DaemonError>>,
}

impl TestDaemon {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let factory = MockFactory::default();
        let calls = Arc::clone(&factory.calls);

        let context = Arc::new(DaemonContext::new(Arc::new(factory)));
        let daemon = Daemon::bind(&path, Arc::clone(&context)).await.unwrap();
        let handle = tokio::spawn(daemon.serve());

        Self {
            _dir: dir,
            path,
            calls,
            context,
            handle,
        }
    }

    /// Connect and read the daemon's greeting
    async fn connect(&self) -> Channel<UnixStream> {
        let mut channel = Channel::connect(&self.path).await.unwrap();
        assert_eq!(
            channel.receive().await.unwrap(),
            Packet::ConfigRequest {
                version: submit_common::VERSION.to_string()
            }
        );
        channel
    }

    /// Connect, hand over the configuration and `request`
    async fn submit(&self, request: Packet) -> Channel<UnixStream> {
        let mut channel = self.connect().await;
        let reply = channel
            .request(&Packet::Config(Box::new(config())))
            .await
            .unwrap();
        assert_eq!(reply, Packet::MessageRequest);
        channel.send(&request).await.unwrap();
        channel
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn config() -> Config {
    Config {
        methods: vec![
            Method {
                domains: Some(vec!["example.com".to_string()]),
                ..Method::new("work")
            },
            Method {
                domains: Some(vec!["broken.org".to_string()]),
                ..Method::new("broken")
            },
        ],
        ..Config::default()
    }
}

fn unlock_work() -> Packet {
    Packet::UnlockRequest {
        method: Some("work".to_string()),
    }
}

fn password_request(first: bool) -> Packet {
    password_request_for("work", first)
}

fn password_request_for(method: &str, first: bool) -> Packet {
    Packet::PasswordRequest {
        method: method.to_string(),
        key: "password".to_string(),
        prompt: "Password:".to_string(),
        first,
    }
}

fn password(secret: &str) -> Packet {
    Packet::PasswordResponse {
        secret: secret.to_string().into(),
    }
}

async fn assert_closed(channel: &mut Channel<UnixStream>) {
    assert!(matches!(channel.receive().await, Err(ChannelError::Eof)));
}

#[tokio::test]
async fn test_probe_is_answered_with_close() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.connect().await;

    assert_eq!(channel.request(&Packet::Probe).await.unwrap(), Packet::CloseRequest);
    assert_closed(&mut channel).await;
    assert!(daemon.calls().is_empty());
}

#[tokio::test]
async fn test_unlock_authenticates_without_delivering() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.submit(unlock_work()).await;

    assert_eq!(channel.receive().await.unwrap(), password_request(true));
    assert_eq!(
        channel.request(&password(PASSWORD)).await.unwrap(),
        Packet::CloseRequest
    );
    assert_closed(&mut channel).await;

    assert_eq!(daemon.calls(), vec!["authenticate work", "abort work"]);
}

#[tokio::test]
async fn test_passwords_are_cached_between_sessions() {
    let daemon = TestDaemon::start().await;

    let mut channel = daemon.submit(unlock_work()).await;
    assert_eq!(channel.receive().await.unwrap(), password_request(true));
    assert_eq!(
        channel.request(&password(PASSWORD)).await.unwrap(),
        Packet::CloseRequest
    );

    let message = Message::new("me@example.com", ["alice@example.com"], "hi\n");
    let mut channel = daemon.submit(Packet::Message(message)).await;
    assert_eq!(channel.receive().await.unwrap(), Packet::DeliverySuccess);
    assert_closed(&mut channel).await;

    assert_eq!(
        daemon.calls(),
        vec![
            "authenticate work",
            "abort work",
            "authenticate work",
            "deliver work alice@example.com",
        ]
    );
}

#[tokio::test]
async fn test_wrong_password_is_asked_again() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.submit(unlock_work()).await;

    assert_eq!(channel.receive().await.unwrap(), password_request(true));
    assert_eq!(
        channel.request(&password("wrong")).await.unwrap(),
        password_request(false)
    );
    assert_eq!(
        channel.request(&password(PASSWORD)).await.unwrap(),
        Packet::CloseRequest
    );
}

#[tokio::test]
async fn test_cancelled_password_is_a_user_error() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.submit(unlock_work()).await;

    assert_eq!(channel.receive().await.unwrap(), password_request(true));
    let Packet::UserError(error) = channel.request(&Packet::AuthCancelled).await.unwrap() else {
        panic!("expected a user error");
    };
    assert!(error.is_authentication());
    assert_eq!(error.render(), "Aborted on user request.");
    assert_closed(&mut channel).await;

    assert_eq!(daemon.calls(), vec!["authenticate work", "abort work"]);
}

#[tokio::test]
async fn test_internal_errors_are_reported() {
    let daemon = TestDaemon::start().await;
    let message = Message::new("me@example.com", ["bob@broken.org"], "hi\n");
    let mut channel = daemon.submit(Packet::Message(message)).await;

    assert_eq!(channel.receive().await.unwrap(), password_request_for("broken", true));
    let reply = channel.request(&password(PASSWORD)).await.unwrap();
    assert_eq!(
        reply,
        Packet::InternalError {
            cause: "Internal error: disk on fire".to_string()
        }
    );

    assert_eq!(
        daemon.calls(),
        vec![
            "authenticate broken",
            "deliver broken bob@broken.org",
            "abort broken",
        ]
    );
}

#[tokio::test]
async fn test_unexpected_packet_is_an_internal_error() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.connect().await;

    let reply = channel.request(&Packet::MessageRequest).await.unwrap();
    assert_eq!(
        reply,
        Packet::InternalError {
            cause: "Unexpected packet: MessageRequest".to_string()
        }
    );
    assert_closed(&mut channel).await;
}

#[tokio::test]
async fn test_disconnect_during_password_request() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.submit(unlock_work()).await;
    assert_eq!(channel.receive().await.unwrap(), password_request(true));
    drop(channel);

    // The daemon keeps serving other frontends
    let mut channel = daemon.connect().await;
    assert_eq!(channel.request(&Packet::Probe).await.unwrap(), Packet::CloseRequest);
}

#[tokio::test]
async fn test_shutdown_request_stops_the_daemon() {
    let daemon = TestDaemon::start().await;
    let mut channel = daemon.connect().await;

    channel.send(&Packet::ShutdownRequest).await.unwrap();
    assert_closed(&mut channel).await;

    daemon.handle.await.unwrap().unwrap();
    assert!(!daemon.path.exists());
    assert!(matches!(
        Channel::connect(&daemon.path).await.err().unwrap(),
        ChannelError::Unavailable
    ));
}

#[tokio::test]
async fn test_replaced_socket_is_left_alone() {
    let first = TestDaemon::start().await;

    // A second daemon takes over the socket path
    let context = Arc::new(DaemonContext::new(Arc::new(MockFactory::default())));
    let second = Daemon::bind(&first.path, context).await.unwrap();
    let second_handle = tokio::spawn(second.serve());

    first.context.shutdown();
    first.handle.await.unwrap().unwrap();
    assert!(first.path.exists());

    let mut channel = Channel::connect(&first.path).await.unwrap();
    assert!(matches!(
        channel.receive().await.unwrap(),
        Packet::ConfigRequest { .. }
    ));
    channel.send(&Packet::ShutdownRequest).await.unwrap();
    assert_closed(&mut channel).await;

    second_handle.await.unwrap().unwrap();
    assert!(!first.path.exists());
}
