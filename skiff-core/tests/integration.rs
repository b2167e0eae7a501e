//! Integration tests: whole dispatch chains over the scripted transport,
//! driven through the public pump and wait entry points.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};

use skiff_core::wire::{self, OpenConfirmation, OpenFailure};
use skiff_core::{
    Channel, ChannelSet, ChannelWindow, ExtendedDataMode, KeyExchange, Listener, MessageType,
    OpenFailureReason, ReadEvent, ScriptedTransport, Session, SessionConfig, SessionHooks,
    SkiffError, WaitDeadline, retry,
};

// ── Helpers ──────────────────────────────────────────────────────

fn connected(config: SessionConfig) -> Session<ScriptedTransport> {
    let mut s = Session::new(ScriptedTransport::new(), config);
    s.phase_mut().complete_handshake().unwrap();
    s
}

fn data(local: u32, len: usize) -> Bytes {
    let mut b = BytesMut::new();
    b.put_u8(MessageType::ChannelData.code());
    b.put_u32(local);
    b.put_u32(len as u32);
    b.put_slice(&vec![b'd'; len]);
    b.freeze()
}

fn extended_data(local: u32, len: usize) -> Bytes {
    let mut b = BytesMut::new();
    b.put_u8(MessageType::ChannelExtendedData.code());
    b.put_u32(local);
    b.put_u32(1);
    b.put_u32(len as u32);
    b.put_slice(&vec![b'e'; len]);
    b.freeze()
}

fn forwarded_open(sender: u32, host: &str, port: u32) -> Bytes {
    let mut b = BytesMut::new();
    b.put_u8(MessageType::ChannelOpen.code());
    wire::put_string(&mut b, b"forwarded-tcpip");
    b.put_u32(sender);
    b.put_u32(65536);
    b.put_u32(16384);
    wire::put_string(&mut b, host.as_bytes());
    b.put_u32(port);
    wire::put_string(&mut b, b"192.0.2.10");
    b.put_u32(40000);
    b.freeze()
}

fn x11_open(sender: u32) -> Bytes {
    let mut b = BytesMut::new();
    b.put_u8(MessageType::ChannelOpen.code());
    wire::put_string(&mut b, b"x11");
    b.put_u32(sender);
    b.put_u32(4096);
    b.put_u32(1024);
    wire::put_string(&mut b, b"127.0.0.1");
    b.put_u32(6010);
    b.freeze()
}

fn disconnect(reason: u32, text: &str) -> Bytes {
    let mut b = BytesMut::new();
    b.put_u8(MessageType::Disconnect.code());
    b.put_u32(reason);
    wire::put_string(&mut b, text.as_bytes());
    wire::put_string(&mut b, b"");
    b.freeze()
}

#[derive(Default)]
struct Events {
    disconnects: Vec<(u32, String)>,
    x11: Vec<(u32, String, u32)>,
    integrity_failures: usize,
}

struct RecordingHooks {
    events: Rc<RefCell<Events>>,
    accept_bad_mac: bool,
    drop_x11: bool,
}

impl RecordingHooks {
    fn new(events: &Rc<RefCell<Events>>) -> Self {
        Self {
            events: Rc::clone(events),
            accept_bad_mac: false,
            drop_x11: false,
        }
    }
}

impl SessionHooks for RecordingHooks {
    fn disconnect(&mut self, reason: u32, message: &str, _language: &str) {
        self.events
            .borrow_mut()
            .disconnects
            .push((reason, message.to_string()));
    }

    fn integrity_failure(&mut self, _payload: &[u8]) -> bool {
        self.events.borrow_mut().integrity_failures += 1;
        self.accept_bad_mac
    }

    fn x11_opened(&mut self, channels: &mut ChannelSet, local_id: u32, host: &str, port: u32) {
        self.events
            .borrow_mut()
            .x11
            .push((local_id, host.to_string(), port));
        if self.drop_x11 {
            channels.remove(local_id);
        }
    }
}

/// Key exchange that completes once the peer's NEWKEYS arrives.
struct NewKeysExchange {
    deadline: WaitDeadline,
    completed: Rc<RefCell<u32>>,
}

impl KeyExchange<ScriptedTransport> for NewKeysExchange {
    fn exchange(&mut self, session: &mut Session<ScriptedTransport>) -> Result<(), SkiffError> {
        session.require(MessageType::NewKeys.code(), None, &mut self.deadline)?;
        *self.completed.borrow_mut() += 1;
        Ok(())
    }
}

struct FailingExchange;

impl KeyExchange<ScriptedTransport> for FailingExchange {
    fn exchange(&mut self, _session: &mut Session<ScriptedTransport>) -> Result<(), SkiffError> {
        Err(SkiffError::KeyExchange("no common host key algorithm".into()))
    }
}

// ── Teardown ─────────────────────────────────────────────────────

#[test]
fn disconnect_reaches_hook_once_and_stops_reads() {
    let events = Rc::new(RefCell::new(Events::default()));
    let mut s = connected(SessionConfig::default()).with_hooks(RecordingHooks::new(&events));
    s.transport_mut().push_packet(disconnect(11, "bye"));
    s.transport_mut().push_packet(vec![52]);

    assert!(matches!(s.pump(), Err(SkiffError::PeerDisconnected)));
    assert!(s.is_disconnected());
    assert!(matches!(s.pump(), Err(SkiffError::PeerDisconnected)));

    assert_eq!(events.borrow().disconnects, vec![(11, "bye".to_string())]);
    assert_eq!(s.transport().pending_reads(), 1);
    assert!(s.brigade().is_empty());
}

#[test]
fn bad_mac_is_fatal_without_override() {
    let events = Rc::new(RefCell::new(Events::default()));
    let mut s = connected(SessionConfig::default()).with_hooks(RecordingHooks::new(&events));
    s.transport_mut().push_bad_mac(vec![52]);

    assert!(matches!(s.pump(), Err(SkiffError::InvalidIntegrityCheck)));
    assert!(s.brigade().is_empty());
    let events = events.borrow();
    assert_eq!(events.integrity_failures, 1);
    assert_eq!(events.disconnects, vec![(5, "Invalid MAC received".to_string())]);
}

#[test]
fn bad_mac_override_queues_message() {
    let events = Rc::new(RefCell::new(Events::default()));
    let hooks = RecordingHooks {
        accept_bad_mac: true,
        ..RecordingHooks::new(&events)
    };
    let mut s = connected(SessionConfig::default()).with_hooks(hooks);
    s.transport_mut().push_bad_mac(vec![52]);

    assert_eq!(s.pump().unwrap(), Some(52));
    let msg = s.fetch(52, None).unwrap();
    assert_eq!(msg.mac_status(), skiff_core::MacStatus::ConfirmedDespiteMismatch);
    assert!(events.borrow().disconnects.is_empty());
}

// ── Flow control ─────────────────────────────────────────────────

#[test]
fn window_truncates_second_message() {
    let mut s = connected(SessionConfig::default());
    s.channels_mut().insert(Channel::new(
        "session",
        0,
        17,
        ChannelWindow::new(150, 32768, 0, 32768),
    ));
    s.transport_mut().push_packet(data(0, 100));
    s.transport_mut().push_packet(data(0, 100));
    s.transport_mut().push_packet(data(0, 100));

    for _ in 0..3 {
        s.pump().unwrap();
    }

    let first = s.fetch(94, None).unwrap();
    let second = s.fetch(94, None).unwrap();
    assert_eq!(first.data().len(), 100);
    assert_eq!(second.data().len(), 50);
    assert_eq!(second.header_skip(), 9);
    assert!(s.fetch(94, None).is_none());
    assert_eq!(s.channels().locate(0).unwrap().window().local_window_size, 0);
}

#[test]
fn ignored_stderr_refund_survives_write_stall() {
    let mut s = connected(SessionConfig::default());
    s.channels_mut().insert(
        Channel::new("session", 4, 40, ChannelWindow::new(1000, 500, 0, 0))
            .with_extended_data(ExtendedDataMode::Ignore),
    );
    s.transport_mut().stall_writes(1);
    s.transport_mut().push_packet(extended_data(4, 800));

    assert!(s.pump().unwrap_err().is_would_block());
    assert!(s.has_inflight());
    assert_eq!(s.pump().unwrap(), Some(95));

    assert_eq!(s.transport().written(), &[wire::window_adjust(40, 500)]);
    assert_eq!(s.channels().locate(4).unwrap().window().local_window_size, 1000);
    assert!(s.brigade().is_empty());
}

#[test]
fn window_adjust_and_exit_status_are_absorbed() {
    let mut s = connected(SessionConfig::default());
    s.channels_mut().insert(Channel::new(
        "session",
        2,
        20,
        ChannelWindow::new(100, 100, 10, 100),
    ));
    s.transport_mut()
        .push_packet(vec![93, 0, 0, 0, 2, 0, 0, 0, 90]);
    let mut req = BytesMut::new();
    req.put_u8(98);
    req.put_u32(2);
    wire::put_string(&mut req, b"exit-status");
    req.put_u8(0);
    req.put_u32(127);
    s.transport_mut().push_packet(req.freeze());
    s.transport_mut().push_packet(vec![96, 0, 0, 0, 2]);
    s.transport_mut().push_packet(vec![97, 0, 0, 0, 2]);

    while s.pump().unwrap().is_some() {}

    let ch = s.channels().locate(2).unwrap();
    assert_eq!(ch.window().remote_window_size, 100);
    assert_eq!(ch.exit_status(), Some(127));
    assert!(ch.remote_eof());
    assert!(ch.remote_close());
    assert!(s.brigade().is_empty());
    assert!(s.transport().written().is_empty());
}

// ── Forwarded connections ────────────────────────────────────────

#[test]
fn forward_without_listener_is_prohibited() {
    let mut s = connected(SessionConfig::default());
    s.listeners_mut().add(Listener::new("localhost", 8080, 0));
    s.transport_mut().push_packet(forwarded_open(3, "localhost", 9090));
    s.pump().unwrap();

    let failure = OpenFailure::decode(&s.transport().written()[0]).unwrap();
    assert_eq!(failure.peer_channel, 3);
    assert_eq!(failure.reason, OpenFailureReason::AdministrativelyProhibited);
    assert_eq!(failure.description, "Forward not requested");
    assert!(s.channels().is_empty());
}

#[test]
fn full_listener_queue_refuses_with_resource_shortage() {
    let mut s = connected(SessionConfig::default());
    let idx = s.listeners_mut().add(Listener::new("localhost", 8080, 1));
    s.transport_mut().push_packet(forwarded_open(3, "localhost", 8080));
    s.transport_mut().push_packet(forwarded_open(4, "localhost", 8080));
    s.pump().unwrap();
    s.pump().unwrap();

    let written = s.transport().written();
    assert_eq!(written.len(), 2);
    let conf = OpenConfirmation::decode(&written[0]).unwrap();
    assert_eq!(conf.peer_channel, 3);
    let failure = OpenFailure::decode(&written[1]).unwrap();
    assert_eq!(failure.peer_channel, 4);
    assert_eq!(failure.reason, OpenFailureReason::ResourceShortage);
    assert_eq!(s.listeners().get(idx).unwrap().queue_size(), 1);

    let accepted = s.listeners_mut().get_mut(idx).unwrap().accept().unwrap();
    assert_eq!(accepted.remote_id(), 3);
    assert_eq!(accepted.window().remote_window_size, 65536);
    assert_eq!(accepted.window().remote_packet_size, 16384);
}

#[test]
fn channel_limit_refuses_forward() {
    let config = SessionConfig {
        max_channels: 1,
        ..Default::default()
    };
    let mut s = connected(config);
    s.channels_mut().insert(Channel::new(
        "session",
        0,
        1,
        ChannelWindow::new(1, 1, 1, 1),
    ));
    s.listeners_mut().add(Listener::new("localhost", 8080, 0));
    s.transport_mut().push_packet(forwarded_open(3, "localhost", 8080));
    s.pump().unwrap();

    let failure = OpenFailure::decode(&s.transport().written()[0]).unwrap();
    assert_eq!(failure.reason, OpenFailureReason::ResourceShortage);
    assert_eq!(s.listeners().pending_total(), 0);
}

#[test]
fn stalled_confirmation_is_sent_once_with_one_channel() {
    let mut s = connected(SessionConfig::default());
    let idx = s.listeners_mut().add(Listener::new("localhost", 8080, 0));
    s.transport_mut().stall_writes(4);
    s.transport_mut().push_packet(forwarded_open(3, "localhost", 8080));
    s.transport_mut().push_packet(forwarded_open(5, "localhost", 8080));

    let mut waits = 0;
    retry::block_on(|| s.pump(), || waits += 1).unwrap();
    retry::block_on(|| s.pump(), || waits += 1).unwrap();
    assert_eq!(waits, 4);

    let written = s.transport().written();
    assert_eq!(written.len(), 2);
    let first = OpenConfirmation::decode(&written[0]).unwrap();
    let second = OpenConfirmation::decode(&written[1]).unwrap();
    assert_eq!((first.peer_channel, first.local_channel), (3, 0));
    assert_eq!((second.peer_channel, second.local_channel), (5, 1));
    assert_eq!(s.listeners().get(idx).unwrap().queue_size(), 2);
}

// ── X11 ──────────────────────────────────────────────────────────

#[test]
fn x11_refused_when_disabled() {
    let events = Rc::new(RefCell::new(Events::default()));
    let mut s = connected(SessionConfig::default()).with_hooks(RecordingHooks::new(&events));
    s.transport_mut().push_packet(x11_open(8));
    s.pump().unwrap();

    let failure = OpenFailure::decode(&s.transport().written()[0]).unwrap();
    assert_eq!(failure.peer_channel, 8);
    assert_eq!(failure.reason, OpenFailureReason::ResourceShortage);
    assert_eq!(failure.description, "X11 Forward Unavailable");
    assert!(events.borrow().x11.is_empty());
}

#[test]
fn x11_accepted_links_channel_and_calls_hook() {
    let events = Rc::new(RefCell::new(Events::default()));
    let config = SessionConfig {
        x11_forwarding: true,
        ..Default::default()
    };
    let mut s = connected(config).with_hooks(RecordingHooks::new(&events));
    s.transport_mut().push_packet(x11_open(8));
    s.pump().unwrap();

    let conf = OpenConfirmation::decode(&s.transport().written()[0]).unwrap();
    assert_eq!(conf.peer_channel, 8);
    let ch = s.channels().locate(conf.local_channel).unwrap();
    assert_eq!(ch.channel_type(), "x11");
    assert_eq!(ch.remote_id(), 8);
    assert_eq!(
        events.borrow().x11,
        vec![(conf.local_channel, "127.0.0.1".to_string(), 6010)]
    );
}

#[test]
fn x11_hook_may_drop_channel() {
    let events = Rc::new(RefCell::new(Events::default()));
    let hooks = RecordingHooks {
        drop_x11: true,
        ..RecordingHooks::new(&events)
    };
    let config = SessionConfig {
        x11_forwarding: true,
        ..Default::default()
    };
    let mut s = connected(config).with_hooks(hooks);
    s.transport_mut().push_packet(x11_open(8));
    s.pump().unwrap();

    assert!(s.channels().is_empty());
    assert_eq!(events.borrow().x11.len(), 1);
}

#[test]
fn stalled_x11_confirmation_links_one_channel_and_calls_hook_once() {
    let events = Rc::new(RefCell::new(Events::default()));
    let config = SessionConfig {
        x11_forwarding: true,
        ..Default::default()
    };
    let mut s = connected(config).with_hooks(RecordingHooks::new(&events));
    s.transport_mut().stall_writes(2);
    s.transport_mut().push_packet(x11_open(8));

    let mut waits = 0;
    let dispatched = retry::block_on(|| s.pump(), || waits += 1).unwrap();
    assert_eq!(dispatched, Some(MessageType::ChannelOpen.code()));
    assert_eq!(waits, 2);
    assert_eq!(s.transport().write_attempts(), 3);

    let written = s.transport().written();
    assert_eq!(written.len(), 1);
    let conf = OpenConfirmation::decode(&written[0]).unwrap();
    assert_eq!((conf.peer_channel, conf.local_channel), (8, 0));
    assert_eq!(s.channels().len(), 1);
    assert_eq!(events.borrow().x11, vec![(0, "127.0.0.1".to_string(), 6010)]);
    assert!(!s.has_inflight());
}

// ── Waiting ──────────────────────────────────────────────────────

#[test]
fn require_waits_across_would_block() {
    let mut s = connected(SessionConfig::default());
    let mut deadline = WaitDeadline::new();
    s.transport_mut().push_packet(vec![53, 0, 0, 0, 0, 0, 0, 0, 0]);
    s.transport_mut().push(ReadEvent::WouldBlock);
    s.transport_mut().push(ReadEvent::NoneYet);
    s.transport_mut().push_packet(vec![52]);

    let msg = retry::block_on(|| s.require(52, None, &mut deadline), || {}).unwrap();
    assert_eq!(msg.message_type(), 52);
    assert!(!deadline.is_set());
    assert_eq!(s.discard_next().unwrap(), 53);
}

#[test]
fn timeout_is_reported_once() {
    let config = SessionConfig {
        read_timeout_secs: 0,
        ..Default::default()
    };
    let mut s = connected(config);
    let mut deadline = WaitDeadline::new();

    assert!(matches!(
        s.require_any(&[51, 52], None, &mut deadline),
        Err(SkiffError::Timeout(_))
    ));
    assert!(!deadline.is_set());

    s.transport_mut().push_packet(vec![51]);
    let msg = s.require_any(&[51, 52], None, &mut deadline).unwrap();
    assert_eq!(msg.message_type(), 51);
}

// ── Key re-exchange ──────────────────────────────────────────────

#[test]
fn kexinit_drives_registered_exchange() {
    let completed = Rc::new(RefCell::new(0));
    let mut s = connected(SessionConfig::default());
    s.set_key_exchange(Box::new(NewKeysExchange {
        deadline: WaitDeadline::new(),
        completed: Rc::clone(&completed),
    }));
    s.transport_mut().push_packet(vec![20, 1, 2, 3]);
    s.transport_mut().push_packet(vec![21]);

    assert_eq!(s.pump().unwrap(), Some(20));
    assert_eq!(*completed.borrow(), 1);
    assert!(s.phase().is_connected());
    assert_eq!(s.transport().read_resets(), 1);
    assert!(s.fetch(20, None).is_some());
    assert!(s.brigade().is_empty());
}

#[test]
fn blocked_exchange_resumes_on_next_pump() {
    let completed = Rc::new(RefCell::new(0));
    let mut s = connected(SessionConfig::default());
    s.set_key_exchange(Box::new(NewKeysExchange {
        deadline: WaitDeadline::new(),
        completed: Rc::clone(&completed),
    }));
    s.transport_mut().push_packet(vec![20]);
    s.transport_mut().push(ReadEvent::WouldBlock);
    s.transport_mut().push_packet(vec![21]);
    s.transport_mut().push_packet(vec![52]);

    assert!(s.pump().unwrap_err().is_would_block());
    assert!(matches!(s.phase(), skiff_core::ConnectionPhase::Rekeying));
    assert!(!s.has_inflight());

    assert_eq!(s.pump().unwrap(), Some(52));
    assert_eq!(*completed.borrow(), 1);
    assert!(s.phase().is_connected());
    assert_eq!(s.brigade().len(), 2);
}

#[test]
fn reply_blocked_inside_exchange_is_written_once() {
    let completed = Rc::new(RefCell::new(0));
    let mut s = connected(SessionConfig::default());
    s.set_key_exchange(Box::new(NewKeysExchange {
        deadline: WaitDeadline::new(),
        completed: Rc::clone(&completed),
    }));
    s.transport_mut().stall_writes(1);
    s.transport_mut().push_packet(vec![20]);
    s.transport_mut().push_packet(vec![80, 0, 0, 0, 1, b'x', 1]);
    s.transport_mut().push_packet(vec![21]);

    assert!(s.pump().unwrap_err().is_would_block());
    assert!(matches!(s.phase(), skiff_core::ConnectionPhase::Rekeying));
    assert!(s.has_inflight());
    assert_eq!(*completed.borrow(), 0);

    assert_eq!(s.pump().unwrap(), None);
    assert_eq!(*completed.borrow(), 1);
    assert!(s.phase().is_connected());
    assert!(!s.has_inflight());
    assert!(s.progress().is_idle());

    let written = s.transport().written();
    assert_eq!(written.len(), 1);
    assert_eq!(&written[0][..], &[MessageType::RequestFailure.code()]);
    let queued: Vec<u8> = s.brigade().iter().map(|m| m.message_type()).collect();
    assert_eq!(queued, vec![20]);
}

#[test]
fn failed_exchange_disconnects() {
    let mut s = connected(SessionConfig::default());
    s.set_key_exchange(Box::new(FailingExchange));
    s.transport_mut().push_packet(vec![20]);

    assert!(matches!(s.pump(), Err(SkiffError::KeyExchange(_))));
    assert!(s.is_disconnected());
    assert!(matches!(s.pump(), Err(SkiffError::PeerDisconnected)));
}
