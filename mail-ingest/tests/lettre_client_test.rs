//! Delivery through a real SMTP client library

mod common;

use common::{start_server, test_config};
use lettre::message::header::ContentType;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

fn mailer(port: u16) -> AsyncSmtpTransport<Tokio1Executor> {
    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
        .port(port)
        .build()
}

fn email(to: &str, message_id: &str) -> Message {
    Message::builder()
        .from("John Doe <john@example.com>".parse().unwrap())
        .to(to.parse().unwrap())
        .subject("Weekly digest")
        .message_id(Some(message_id.to_string()))
        .header(ContentType::TEXT_PLAIN)
        .body("Hello from lettre".to_string())
        .unwrap()
}

#[tokio::test]
async fn test_lettre_delivery() {
    let server = start_server(test_config()).await;
    let mailer = mailer(server.addr.port());

    let response = mailer
        .send(email("publish@gateway.test", "<lettre-1@example.com>"))
        .await
        .unwrap();
    assert!(response.is_positive());

    let events = server.dispatcher.events();
    assert_eq!(events.len(), 1);
    let event = &events[0].event;
    assert_eq!(event.object_url(), Some("lettre-1@example.com"));
    assert_eq!(event.source, "john@example.com");
    assert_eq!(event.data, "Hello from lettre");
}

#[tokio::test]
async fn test_lettre_rejected_recipient_is_permanent() {
    let server = start_server(test_config()).await;
    let mailer = mailer(server.addr.port());

    let err = mailer
        .send(email("nobody@gateway.test", "<lettre-2@example.com>"))
        .await
        .unwrap_err();
    assert!(err.is_permanent());
    assert!(server.dispatcher.is_empty());
}
