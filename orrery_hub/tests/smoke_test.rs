// Integration smoke test for the hub server.
//
// Starts a hub on localhost, connects raw TCP peers, and exercises the full
// protocol lifecycle: authentication, hostship negotiation, data fan-out
// with view-status filtering, and disconnect bookkeeping.
//
// Each peer here is a plain TCP socket using the protocol crate's framing
// and message types — no engine code involved. This tests the hub
// end-to-end without `orrery_sync` (the combined pipeline lives in the
// `session_tests` crate).

use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use orrery_hub::server::{HubConfig, start_hub};
use orrery_protocol::framing::{read_message, write_message};
use orrery_protocol::message::{
    AuthenticationPayload, AuthenticationReply, ConnectionStatusPayload, DataMessage,
    DisconnectionPayload, Message, MessageType, NConnectionsPayload, ViewStatusPayload,
};
use orrery_protocol::types::{DomainType, PROTOCOL_VERSION, PeerId, ViewStatus};

fn send(writer: &mut BufWriter<TcpStream>, msg: &Message) {
    write_message(writer, msg).unwrap();
}

fn recv(reader: &mut BufReader<TcpStream>) -> Message {
    read_message(reader).unwrap()
}

/// Connect to the hub and authenticate. Drains the welcome sequence
/// (Authentication reply, host announcement, peer count) and returns the
/// reader/writer pair, the assigned ID, and the announced host.
fn connect_and_auth(
    addr: std::net::SocketAddr,
    name: &str,
    password: &str,
) -> (
    BufReader<TcpStream>,
    BufWriter<TcpStream>,
    PeerId,
    Option<(PeerId, String)>,
) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    send(
        &mut writer,
        &AuthenticationPayload {
            protocol_version: PROTOCOL_VERSION,
            name: name.into(),
            password: password.into(),
        }
        .into_message(),
    );

    let reply = recv(&mut reader);
    assert_eq!(reply.message_type, MessageType::Authentication);
    let peer_id = AuthenticationReply::decode_payload(&reply.payload)
        .unwrap()
        .peer_id;

    let status = recv(&mut reader);
    assert_eq!(status.message_type, MessageType::ConnectionStatus);
    let host = ConnectionStatusPayload::decode_payload(&status.payload)
        .unwrap()
        .host;

    let count = recv(&mut reader);
    assert_eq!(count.message_type, MessageType::NConnections);

    (reader, writer, peer_id, host)
}

fn data_message(domain: DomainType, timestamp: f64, content: &[u8]) -> Message {
    DataMessage {
        domain,
        timestamp,
        content: content.to_vec(),
    }
    .into_message()
}

#[test]
fn full_session_lifecycle() {
    // 1. Start a hub on a random port.
    let config = HubConfig {
        port: 0, // OS picks a free port
        session_name: "smoke-test".into(),
        ..HubConfig::default()
    };
    let (handle, addr) = start_hub(config).unwrap();

    // Give the listener thread a moment to start.
    std::thread::sleep(Duration::from_millis(50));

    // 2. Two peers authenticate.
    let (mut reader_a, mut writer_a, id_a, host_a) = connect_and_auth(addr, "Alice", "");
    assert_eq!(id_a, PeerId(0));
    assert_eq!(host_a, None);

    let (mut reader_b, mut writer_b, id_b, _host_b) = connect_and_auth(addr, "Bob", "");
    assert_eq!(id_b, PeerId(1));

    // Alice sees the membership change.
    let msg = recv(&mut reader_a);
    assert_eq!(msg.message_type, MessageType::NConnections);
    assert_eq!(
        NConnectionsPayload::decode_payload(&msg.payload).unwrap(),
        NConnectionsPayload(2)
    );

    // 3. Alice requests hostship; both peers get the grant announcement.
    send(&mut writer_a, &Message::empty(MessageType::HostshipRequest));
    for reader in [&mut reader_a, &mut reader_b] {
        let msg = recv(reader);
        assert_eq!(msg.message_type, MessageType::ConnectionStatus);
        let payload = ConnectionStatusPayload::decode_payload(&msg.payload).unwrap();
        assert_eq!(payload.host, Some((PeerId(0), "Alice".into())));
    }

    // 4. Host data is relayed to the follower in send order — the hub does
    //    not reorder; latest-write-wins is applied peer-side.
    send(&mut writer_a, &data_message(DomainType::CAMERA, 10.0, b"C1"));
    send(&mut writer_a, &data_message(DomainType::CAMERA, 9.0, b"C2"));

    let msg = recv(&mut reader_b);
    assert_eq!(msg.message_type, MessageType::Data);
    let first = DataMessage::decode_payload(&msg.payload).unwrap();
    assert_eq!(first.timestamp, 10.0);
    assert_eq!(first.content, b"C1");

    let msg = recv(&mut reader_b);
    let second = DataMessage::decode_payload(&msg.payload).unwrap();
    assert_eq!(second.timestamp, 9.0);
    assert_eq!(second.content, b"C2");

    // 5. Bob opts out of the host's view: camera data stops, time data
    //    keeps flowing.
    send(&mut writer_b, &Message::empty(MessageType::ViewResignation));
    let msg = recv(&mut reader_b);
    assert_eq!(msg.message_type, MessageType::ViewStatus);
    assert_eq!(
        ViewStatusPayload::decode_payload(&msg.payload).unwrap(),
        ViewStatusPayload(ViewStatus::IndependentView)
    );

    send(&mut writer_a, &data_message(DomainType::CAMERA, 11.0, b"C3"));
    send(&mut writer_a, &data_message(DomainType::TIME, 11.0, b"T1"));

    // The next (and only) data frame Bob sees is the TIME one — the camera
    // update was filtered out.
    let msg = recv(&mut reader_b);
    assert_eq!(msg.message_type, MessageType::Data);
    let data = DataMessage::decode_payload(&msg.payload).unwrap();
    assert_eq!(data.domain, DomainType::TIME);
    assert_eq!(data.content, b"T1");

    // 6. The host leaves: Bob sees the resignation and the new peer count.
    send(
        &mut writer_a,
        &DisconnectionPayload {
            reason: String::new(),
        }
        .into_message(),
    );

    let msg = recv(&mut reader_b);
    assert_eq!(msg.message_type, MessageType::HostshipResignation);
    let msg = recv(&mut reader_b);
    assert_eq!(msg.message_type, MessageType::NConnections);
    assert_eq!(
        NConnectionsPayload::decode_payload(&msg.payload).unwrap(),
        NConnectionsPayload(1)
    );

    handle.stop();
}

#[test]
fn version_mismatch_is_fatal_rejection() {
    let config = HubConfig {
        port: 0,
        session_name: "version-test".into(),
        ..HubConfig::default()
    };
    let (handle, addr) = start_hub(config).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    send(
        &mut writer,
        &AuthenticationPayload {
            protocol_version: PROTOCOL_VERSION + 1,
            name: "Future".into(),
            password: String::new(),
        }
        .into_message(),
    );

    let msg = recv(&mut reader);
    assert_eq!(msg.message_type, MessageType::Disconnection);
    let payload = DisconnectionPayload::decode_payload(&msg.payload).unwrap();
    assert!(
        payload.reason.contains("protocol version mismatch"),
        "got: {}",
        payload.reason
    );

    handle.stop();
}

#[test]
fn wrong_password_rejected() {
    let config = HubConfig {
        port: 0,
        session_name: "password-test".into(),
        password: Some("secret".into()),
        ..HubConfig::default()
    };
    let (handle, addr) = start_hub(config).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    // Correct password joins fine.
    let (_reader_a, _writer_a, id_a, _) = connect_and_auth(addr, "Alice", "secret");
    assert_eq!(id_a, PeerId(0));

    // Wrong password gets the reason and no session.
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    send(
        &mut writer,
        &AuthenticationPayload {
            protocol_version: PROTOCOL_VERSION,
            name: "Intruder".into(),
            password: "wrong".into(),
        }
        .into_message(),
    );

    let msg = recv(&mut reader);
    assert_eq!(msg.message_type, MessageType::Disconnection);
    let payload = DisconnectionPayload::decode_payload(&msg.payload).unwrap();
    assert_eq!(payload.reason, "incorrect password");

    handle.stop();
}

#[test]
fn malformed_frame_disconnects_only_the_offender() {
    let config = HubConfig {
        port: 0,
        session_name: "framing-test".into(),
        ..HubConfig::default()
    };
    let (handle, addr) = start_hub(config).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let (mut reader_a, mut writer_a, _id_a, _) = connect_and_auth(addr, "Alice", "");
    let (_reader_c, writer_c, _id_c, _) = connect_and_auth(addr, "Chaos", "");

    // Alice sees Chaos join.
    let msg = recv(&mut reader_a);
    assert_eq!(
        NConnectionsPayload::decode_payload(&msg.payload).unwrap(),
        NConnectionsPayload(2)
    );

    // Chaos sends a frame with a bad magic: fatal to Chaos only.
    let mut raw = writer_c;
    raw.write_all(b"XXXX").unwrap();
    raw.write_all(&MessageType::Data.as_u32().to_be_bytes())
        .unwrap();
    raw.write_all(&4u32.to_be_bytes()).unwrap();
    raw.write_all(&[1, 2, 3, 4]).unwrap();
    raw.flush().unwrap();

    // Alice observes the membership drop and is otherwise unaffected.
    let msg = recv(&mut reader_a);
    assert_eq!(msg.message_type, MessageType::NConnections);
    assert_eq!(
        NConnectionsPayload::decode_payload(&msg.payload).unwrap(),
        NConnectionsPayload(1)
    );

    // The hub still serves Alice: hostship works.
    send(&mut writer_a, &Message::empty(MessageType::HostshipRequest));
    let msg = recv(&mut reader_a);
    assert_eq!(msg.message_type, MessageType::ConnectionStatus);
    let payload = ConnectionStatusPayload::decode_payload(&msg.payload).unwrap();
    assert_eq!(payload.host, Some((PeerId(0), "Alice".into())));

    handle.stop();
}
