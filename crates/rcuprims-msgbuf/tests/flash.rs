use std::sync::Arc;

use rcuprims_msgbuf::registers::{CONTROL, CTRL_SELECTMAP};
use rcuprims_msgbuf::sim::{SIM_FLASH_ID, SIM_SECTOR_WORDS};
use rcuprims_msgbuf::{
    Channel, ChannelConfig, ErrorKind, FlashAccess, FlashErase, ManualClock, Mode, MsgBufError,
    SimHandle, SimulatedRcu,
};
use rcuprims_transport::{BackendConfig, MemoryHandle};

fn open(firmware_version: u32, config: ChannelConfig) -> (Channel, SimHandle, MemoryHandle) {
    let (backend, sim) = SimulatedRcu::backend(BackendConfig {
        command_buffer_size: 64,
        result_buffer_size: 64,
        register_file_size: 16,
        firmware_version,
        ..BackendConfig::default()
    });
    let memory = backend.handle();
    let channel =
        Channel::from_backend_with_clock(Box::new(backend), config, Arc::new(ManualClock::new()))
            .expect("channel should open");
    (channel, sim, memory)
}

fn exercise_flash(channel: &mut Channel, sim: &SimHandle) {
    let data: Vec<u16> = (0..40).map(|i| 0x1200 + i).collect();
    channel.flash_write(0x100, &data).unwrap();
    assert_eq!(sim.flash(0x100 + 39), 0x1200 + 39);
    assert_eq!(channel.flash_read(0x100, 40).unwrap(), data);
    assert_eq!(channel.mode().unwrap(), Mode::MessageBuffer);

    assert_eq!(channel.flash_identify().unwrap(), SIM_FLASH_ID);
    channel.flash_reset().unwrap();

    sim.set_flash(SIM_SECTOR_WORDS, 0x0000);
    sim.set_flash(2 * SIM_SECTOR_WORDS, 0x0000);
    sim.set_flash(3 * SIM_SECTOR_WORDS, 0x0000);
    channel.flash_erase(FlashErase::Sector(1)).unwrap();
    assert_eq!(sim.flash(SIM_SECTOR_WORDS), 0xffff);
    assert_eq!(sim.flash(2 * SIM_SECTOR_WORDS), 0x0000);

    channel
        .flash_erase(FlashErase::Sectors { first: 2, count: 2 })
        .unwrap();
    assert_eq!(sim.flash(3 * SIM_SECTOR_WORDS), 0xffff);
    assert_eq!(sim.flash(0x100), 0x1200);

    channel.flash_erase(FlashErase::All).unwrap();
    assert_eq!(sim.flash(0x100), 0xffff);
    assert_eq!(channel.mode().unwrap(), Mode::MessageBuffer);
}

#[test]
fn flash_through_message_buffer() {
    let (mut channel, sim, _) = open(0x0002_0200, ChannelConfig::default());
    assert_eq!(channel.flash_access(), FlashAccess::MessageBuffer);
    let before = sim.executed();
    exercise_flash(&mut channel, &sim);
    assert!(sim.executed() > before);
}

#[test]
fn flash_through_legacy_controller() {
    let (mut channel, sim, _) = open(0x0002_0000, ChannelConfig::default());
    assert_eq!(channel.flash_access(), FlashAccess::LegacyBus);
    exercise_flash(&mut channel, &sim);
    assert_eq!(sim.executed(), 0);
}

#[test]
fn legacy_controller_can_be_forced() {
    let config = ChannelConfig::default().with_flash_access(FlashAccess::LegacyBus);
    let (mut channel, sim, _) = open(0x0002_0200, config);
    channel.flash_write(7, &[0xabcd]).unwrap();
    assert_eq!(channel.flash_read(7, 1).unwrap(), vec![0xabcd]);
    assert_eq!(sim.executed(), 0);
}

#[test]
fn flash_programming_only_clears_bits() {
    let (mut channel, _, _) = open(0x0002_0200, ChannelConfig::default());
    channel.flash_write(0, &[0xff0f]).unwrap();
    channel.flash_write(0, &[0x0fff]).unwrap();
    assert_eq!(channel.flash_read(0, 1).unwrap(), vec![0x0f0f]);
}

#[test]
fn stuck_controller_times_out_and_restores_mode() {
    let config = ChannelConfig {
        flash_wait_states: 32,
        ..ChannelConfig::default()
    };
    let (mut channel, sim, _) = open(0x0001_0000, config);
    sim.set_flash_stuck(true);

    let err = channel.flash_read(0, 1).unwrap_err();
    assert!(matches!(err, MsgBufError::FlashTimeout(32)));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(channel.mode().unwrap(), Mode::MessageBuffer);

    sim.set_flash_stuck(false);
    assert_eq!(channel.flash_read(0, 1).unwrap(), vec![0xffff]);
}

#[test]
fn firmware_errors_still_restore_mode() {
    let (mut channel, sim, _) = open(0x0002_0200, ChannelConfig::default());
    sim.force_status(Some(0x08));
    assert!(channel.flash_identify().is_err());
    assert_eq!(channel.mode().unwrap(), Mode::MessageBuffer);
}

#[test]
fn mode_transitions_go_through_message_buffer() {
    let (mut channel, _, _) = open(0x0002_0200, ChannelConfig::default());
    channel.set_mode(Mode::Flash).unwrap();
    assert!(channel.check_mode(Mode::Flash).unwrap());

    let err = channel.set_mode(Mode::SelectMap).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::ModeTransitionNotAllowed {
            from: Mode::Flash,
            to: Mode::SelectMap
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Precondition);

    channel.set_mode(Mode::MessageBuffer).unwrap();
    channel.set_mode(Mode::SelectMap).unwrap();
    assert_eq!(channel.mode().unwrap(), Mode::SelectMap);
    channel.set_mode(Mode::SelectMap).unwrap();
}

#[test]
fn unapplied_mode_write_is_a_fault() {
    let (mut channel, sim, _) = open(0x0002_0200, ChannelConfig::default());
    sim.set_ignore_mode_writes(true);
    let err = channel.set_mode(Mode::Flash).unwrap_err();
    assert!(matches!(
        err,
        MsgBufError::ModeNotApplied {
            target: Mode::Flash,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::HardwareFault);
}

#[test]
fn both_mode_bits_is_a_fault() {
    let (mut channel, _, memory) = open(0x0002_0200, ChannelConfig::default());
    memory.with_map(|map| map.set_register(CONTROL, CTRL_SELECTMAP | 0x04));
    let err = channel.mode().unwrap_err();
    assert!(matches!(err, MsgBufError::InvalidModeBits(0x0c)));
    assert!(channel.single_read(0).is_err());
}
