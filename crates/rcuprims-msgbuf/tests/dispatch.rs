use std::sync::Arc;
use std::time::Duration;

use rcuprims_frame::command::{SINGLE_READ, SINGLE_WRITE};
use rcuprims_frame::{BlockBuilder, Header, StatusError};
use rcuprims_msgbuf::registers::{CONTROL, CTRL_EXECUTE, CTRL_REREAD};
use rcuprims_msgbuf::{
    Channel, ChannelConfig, Clock, ErrorKind, ManualClock, Mode, MsgBufError, OptionFlags,
    SimHandle, SimulatedRcu,
};
use rcuprims_transport::{BackendConfig, MemoryHandle};

fn small_board(firmware_version: u32) -> BackendConfig {
    BackendConfig {
        command_buffer_size: 64,
        result_buffer_size: 64,
        register_file_size: 16,
        firmware_version,
        ..BackendConfig::default()
    }
}

fn open(board: BackendConfig, config: ChannelConfig) -> (Channel, SimHandle, MemoryHandle) {
    let (backend, sim) = SimulatedRcu::backend(board);
    let memory = backend.handle();
    let channel =
        Channel::from_backend_with_clock(Box::new(backend), config, Arc::new(ManualClock::new()))
            .expect("channel should open");
    (channel, sim, memory)
}

#[test]
fn single_write_builds_five_word_block() {
    let (mut channel, sim, memory) = open(small_board(0x0002_0200), ChannelConfig::default());
    let format = channel.format();

    channel.single_write(0x1000, 0x42).expect("write should succeed");

    assert_eq!(
        sim.last_command(),
        vec![
            format.make_header(&Header::new(SINGLE_WRITE).with_word_count(2)),
            0x1000,
            0x42,
            format.make_trailer(0),
            format.make_end_marker(),
        ]
    );
    assert_eq!(sim.memory(0x1000), 0x42);
    assert_eq!(memory.with_map(|map| map.register(CONTROL)) & CTRL_EXECUTE, 0);
    assert_eq!((memory.lock_calls(), memory.unlock_calls()), (1, 1));
    assert!(!memory.is_locked());
}

#[test]
fn single_read_returns_memory_word() {
    let (mut channel, sim, _) = open(small_board(0x0001_0000), ChannelConfig::default());
    sim.set_memory(0x2001, 0xcafe_f00d);
    assert_eq!(channel.single_read(0x2001).unwrap(), 0xcafe_f00d);
    assert_eq!(channel.single_read(0x2002).unwrap(), 0);
}

#[test]
fn wrong_mode_leaves_result_region_untouched() {
    let (mut channel, sim, memory) = open(small_board(0x0002_0200), ChannelConfig::default());
    channel.set_mode(Mode::Flash).unwrap();
    memory.with_map(|map| map.write_result_words(&[0xdead_beef; 4]));

    let err = channel.single_read(0x10).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::WrongMode {
            expected: Mode::MessageBuffer,
            actual: Mode::Flash
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(sim.executed(), 0);
    assert_eq!(memory.with_map(|map| map.result_words()[..4].to_vec()), vec![0xdead_beef; 4]);
    assert!(!memory.is_locked());
}

#[test]
fn timeout_clears_execute_and_channel_recovers() {
    let config = ChannelConfig::default()
        .with_timeout(Duration::from_millis(10))
        .with_poll_interval(Duration::from_millis(1));
    let clock = Arc::new(ManualClock::new());
    let (backend, sim) = SimulatedRcu::backend(small_board(0x0002_0200));
    let memory = backend.handle();
    let mut channel = Channel::from_backend_with_clock(Box::new(backend), config, clock.clone())
        .expect("channel should open");
    sim.hang_next(1);

    let started = clock.now();
    let err = channel.single_write(0x20, 7).unwrap_err();
    let waited = clock.now() - started;
    assert!(matches!(err, MsgBufError::Timeout(t) if t == Duration::from_millis(10)));
    assert!(waited >= Duration::from_millis(10), "gave up after {waited:?}");
    assert!(waited <= Duration::from_millis(11), "gave up after {waited:?}");
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(memory.with_map(|map| map.register(CONTROL)) & CTRL_EXECUTE, 0);
    assert!(!memory.is_locked());

    channel.single_write(0x20, 7).expect("redispatch should succeed");
    assert_eq!(sim.memory(0x20), 7);
}

#[test]
fn explicit_timeout_overrides_default() {
    let config = ChannelConfig::default().with_poll_interval(Duration::from_millis(1));
    let (mut channel, sim, _) = open(small_board(0x0002_0200), config);
    sim.hang_next(1);
    let command = BlockBuilder::new(channel.format())
        .block(SINGLE_READ, vec![0])
        .finish()
        .unwrap();
    let err = channel
        .dispatch(&command, Duration::from_millis(5))
        .unwrap_err();
    assert!(matches!(err, MsgBufError::Timeout(t) if t == Duration::from_millis(5)));
}

#[test]
fn status_word_maps_to_protocol_error() {
    let (mut channel, sim, _) = open(small_board(0x0002_0200), ChannelConfig::default());
    sim.force_status(Some(0x01 | 0x04));
    let err = channel.single_read(0).unwrap_err();
    assert_eq!(err.status(), Some(StatusError::NoTargetAnswer));
    assert_eq!(err.kind(), ErrorKind::Protocol);

    sim.force_status(Some(0x40));
    let err = channel.single_read(0).unwrap_err();
    assert_eq!(err.status(), Some(StatusError::Unknown(0x40)));

    sim.force_status(None);
    channel.single_read(0).expect("clean status should succeed");
}

#[test]
fn echoed_command_id_must_match() {
    let (mut channel, sim, _) = open(small_board(0x0002_0000), ChannelConfig::default());
    sim.override_echo(Some(SINGLE_READ));
    let err = channel.single_write(0, 0).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::IdMismatch {
            sent: SINGLE_WRITE,
            echoed: SINGLE_READ
        }
    ));
    assert_eq!(err.kind(), ErrorKind::HardwareFault);
}

#[test]
fn id_check_compares_command_field_only() {
    // Older tooling compared `echo & 0xc000` with `sent & 0x0c00`, masks that
    // never line up and fall outside the command-id field. Only the decoded
    // command id is compared, so an echo whose other header fields differ is
    // accepted.
    let (mut channel, sim, memory) = open(small_board(0x0002_0200), ChannelConfig::default());
    sim.set_memory(4, 9);
    assert_eq!(channel.single_read(4).unwrap(), 9);

    let format = channel.format();
    let sent = sim.last_command()[0];
    let echoed = memory.with_map(|map| map.result_words()[0]);
    assert_ne!(sent, echoed);
    assert_eq!(
        format.decode_header(sent).command_id,
        format.decode_header(echoed).command_id
    );
    // Both masks select word-count bits here, so they say nothing about ids.
    assert_eq!(echoed & 0xc000, 0);
    assert_eq!(sent & 0x0c00, 0);
}

#[test]
fn impossible_word_counts_are_faults() {
    let (mut channel, sim, _) = open(small_board(0x0002_0200), ChannelConfig::default());

    sim.override_word_count(Some(1));
    let err = channel.single_read(0).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::InvalidWordCount {
            declared: 1,
            capacity: 16
        }
    ));

    sim.override_word_count(Some(17));
    let err = channel.single_read(0).unwrap_err();
    assert!(matches!(err, MsgBufError::InvalidWordCount { declared: 17, .. }));
    assert_eq!(err.kind(), ErrorKind::HardwareFault);

    sim.override_word_count(Some(16));
    channel.single_read(0).expect("a full result buffer is valid");
}

#[test]
fn verification_detects_corruption() {
    let config = ChannelConfig::default().with_flags(OptionFlags::VERIFY);
    let (mut channel, sim, memory) = open(small_board(0x0002_0200), config);

    channel.single_write(1, 2).expect("clean readback should verify");
    assert_eq!(sim.executed(), 1);

    sim.set_corrupt_readback(true);
    let err = channel.single_write(1, 3).unwrap_err();
    assert!(matches!(err, MsgBufError::VerificationFailed { offset: 0 }));
    assert_eq!(sim.executed(), 1);
    assert_eq!(memory.with_map(|map| map.register(CONTROL)) & CTRL_REREAD, 0);

    channel.update_flags(OptionFlags::IGNORE_VERIFY_ERRORS, OptionFlags::empty());
    channel.single_write(1, 3).expect("ignored mismatch should proceed");
    assert_eq!(sim.memory(1), 3);
}

#[test]
fn oversized_command_is_refused() {
    let (mut channel, sim, _) = open(small_board(0x0002_0200), ChannelConfig::default());
    let command = BlockBuilder::new(channel.format())
        .block(SINGLE_WRITE, vec![0; 14])
        .finish()
        .unwrap();
    let err = channel.dispatch(&command, Duration::ZERO).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::CommandTooLarge {
            words: 17,
            capacity: 16
        }
    ));
    assert_eq!(sim.executed(), 0);
    assert!(channel.dispatch(&[], Duration::ZERO).is_err());
}

#[test]
fn malformed_block_reported_by_firmware() {
    let (mut channel, _, _) = open(small_board(0x0002_0200), ChannelConfig::default());
    let mut command = BlockBuilder::new(channel.format())
        .block(SINGLE_WRITE, vec![0, 0])
        .finish()
        .unwrap();
    let last = command.len() - 1;
    command[last] = 0;
    let err = channel.dispatch(&command, Duration::ZERO).unwrap_err();
    assert_eq!(err.status(), Some(StatusError::MissingEndMarker));
}
