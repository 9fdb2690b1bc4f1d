use blinds_core::{
    Command, Controller, ControllerCfg, EncoderCfg, MotionCfg, Profile, ProtectionState,
    SuppressReason, TickStatus, TravelCfg, Zone, ZoneTable,
};
use blinds_hardware::SimPlant;
use blinds_traits::clock::test_clock::TestClock;
use rstest::rstest;

fn open_loop_cfg(max_burst: i32) -> ControllerCfg {
    ControllerCfg {
        travel: TravelCfg {
            top: 4_150_000,
            bottom: 0,
            home: 4_150_000,
        },
        motion: MotionCfg {
            deadzone: 0,
            min_burst: -max_burst,
            max_burst,
            zones: ZoneTable::new(
                vec![
                    Zone::new(0, Profile::new(1500, 30)),
                    Zone::new(400_000, Profile::new(1000, 60)),
                ],
                None,
            )
            .unwrap(),
        },
        encoder: EncoderCfg {
            enabled: false,
            counts_per_rev: 4096,
        },
        ..ControllerCfg::default()
    }
}

fn open_loop(max_burst: i32) -> (Controller, SimPlant, TestClock) {
    let plant = SimPlant::new(0);
    let clock = TestClock::new();
    let mut c = Controller::builder()
        .with_actuator(plant.actuator())
        .with_cfg(open_loop_cfg(max_burst))
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    c.begin().unwrap();
    (c, plant, clock)
}

fn encoder_at(raw_position: i64, cfg: ControllerCfg) -> (Controller, SimPlant, TestClock) {
    let plant = SimPlant::new(raw_position);
    let clock = TestClock::new();
    let mut c = Controller::builder()
        .with_actuator(plant.actuator())
        .with_encoder(plant.encoder(cfg.encoder.counts_per_rev))
        .with_cfg(cfg)
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    c.begin().unwrap();
    (c, plant, clock)
}

#[test]
fn open_loop_boots_at_top_with_report_owed() {
    let (c, _plant, _clock) = open_loop(3200);
    assert_eq!(c.position(), 4_150_000);
    assert_eq!(c.target(), 4_150_000);
    assert!(c.publish_pending());
    assert!(!c.driver_enabled());
}

#[test]
fn scenario_a_large_move_clamps_to_max_burst() {
    let (mut c, plant, _clock) = open_loop(3200);
    c.apply(Command::Feedback(0));
    c.apply(Command::Open);
    let out = c.tick();
    assert_eq!(
        out.status,
        TickStatus::Moving {
            delta: 3200,
            profile: Profile::new(1500, 30)
        }
    );
    assert_eq!(c.position(), 3200);
    assert!(c.driver_enabled());
    assert!(plant.enabled());
    let publication = out.publish.unwrap();
    assert!(!publication.settle);
    assert_eq!(publication.percent, 0);
}

#[test]
fn scenario_b_within_deadzone_settles_and_reports_once() {
    let (mut c, plant, _clock) = encoder_at(650, ControllerCfg::default());
    assert_eq!(c.position(), 650);
    let out = c.tick();
    assert_eq!(out.status, TickStatus::Settled);
    assert!(!c.driver_enabled());
    assert!(!plant.enabled());
    let p = out.publish.expect("settle report");
    assert!(p.settle);
    assert_eq!(p.percent, 100);
    assert_eq!(c.snapshot().reports, 0);
    c.confirm_publication(p);
    assert_eq!(c.snapshot().reports, 1);
    for _ in 0..5 {
        assert_eq!(c.tick().publish, None);
    }
    assert!(plant.moves().is_empty());
}

#[test]
fn unconfirmed_settle_report_is_offered_again() {
    let (mut c, _plant, _clock) = encoder_at(650, ControllerCfg::default());
    assert!(c.tick().publish.is_some());
    assert!(c.tick().publish.is_some());
    assert!(c.publish_pending());
}

#[test]
fn scenario_c_open_is_accepted_while_cooling() {
    let (mut c, plant, clock) = open_loop(3200);
    c.apply(Command::Feedback(0));
    c.apply(Command::Close);
    c.apply(Command::SetPosition(10));
    plant.set_stalled(true);
    assert_eq!(
        c.tick().status,
        TickStatus::Suppressed(SuppressReason::Stall)
    );
    assert!(matches!(
        c.protection_state(),
        ProtectionState::Cooling { .. }
    ));
    clock.advance_ms(100);
    c.apply(Command::Open);
    assert_eq!(c.target(), 4_150_000);
    assert!(c.publish_pending());
    assert!(matches!(
        c.tick().status,
        TickStatus::Suppressed(SuppressReason::Cooling { .. })
    ));
}

#[test]
fn scenario_d_set_position_interpolates() {
    let (mut c, _plant, _clock) = open_loop(3200);
    c.apply(Command::SetPosition(50));
    assert_eq!(c.target(), 2_075_000);
    c.apply(Command::SetPosition(0));
    assert_eq!(c.target(), 0);
    c.apply(Command::SetPosition(100));
    assert_eq!(c.target(), 4_150_000);
}

#[test]
fn scenario_e_encoder_wrap_counts_a_revolution() {
    let cfg = ControllerCfg {
        travel: TravelCfg {
            top: 100_000,
            bottom: 0,
            home: 100_000,
        },
        motion: MotionCfg {
            // Keeps the controller settled so only the plant moves.
            deadzone: 1_000_000,
            ..MotionCfg::default()
        },
        ..ControllerCfg::default()
    };
    let (mut c, plant, _clock) = encoder_at(4000, cfg);
    assert_eq!(c.position(), 4000);
    plant.displace(196);
    c.tick();
    assert_eq!(c.position(), 4096 + 100);
    assert_eq!(c.snapshot().revolutions, Some(1));
    plant.displace(-200);
    c.tick();
    assert_eq!(c.position(), 3996);
    assert_eq!(c.snapshot().revolutions, Some(0));
}

#[test]
fn scenario_f_thermal_warning_backs_off_then_settles() {
    let (mut c, plant, clock) = open_loop(64);
    c.apply(Command::Feedback(0));
    c.apply(Command::Open);
    plant.set_thermal_warning(true);

    let out = c.tick();
    assert_eq!(
        out.status,
        TickStatus::BackingOff {
            delta: -96,
            profile: Profile::new(400, 30)
        }
    );
    assert_eq!(c.position(), -96);
    assert!(out.publish.is_some());
    let last = plant.last_move().unwrap();
    assert_eq!((last.delta, last.current_ma), (-96, 400));

    plant.set_thermal_warning(false);
    clock.advance_ms(2999);
    assert_eq!(
        c.tick().status,
        TickStatus::Suppressed(SuppressReason::Settling { remaining_ms: 1 })
    );
    assert_eq!(plant.moves().len(), 1);

    clock.advance_ms(1);
    assert_eq!(c.tick().status.executed(), 64);
    assert_eq!(c.position(), -32);
    assert_eq!(c.target(), 4_150_000);
}

#[test]
fn stall_holds_motion_for_cooldown_then_resumes() {
    let (mut c, plant, clock) = open_loop(3200);
    c.apply(Command::Feedback(0));
    c.apply(Command::Open);
    assert_eq!(c.tick().status.executed(), 3200);

    plant.set_stalled(true);
    assert_eq!(
        c.tick().status,
        TickStatus::Suppressed(SuppressReason::Stall)
    );
    assert!(!c.driver_enabled());
    assert!(!plant.enabled());
    plant.set_stalled(false);

    for _ in 0..49 {
        clock.advance_ms(100);
        assert!(matches!(
            c.tick().status,
            TickStatus::Suppressed(SuppressReason::Cooling { .. })
        ));
    }
    assert_eq!(plant.moves().len(), 1);

    clock.advance_ms(100);
    assert_eq!(c.tick().status.executed(), 3200);
    assert_eq!(c.protection_state(), ProtectionState::Normal);
    assert_eq!(c.snapshot().stalls, 1);
}

#[test]
fn stop_freezes_target_and_cancels_report() {
    let (mut c, _plant, _clock) = open_loop(3200);
    c.apply(Command::Feedback(0));
    c.apply(Command::Open);
    c.tick();
    c.apply(Command::Stop);
    assert_eq!(c.target(), c.position());
    assert!(!c.publish_pending());
    let out = c.tick();
    assert_eq!(out.status, TickStatus::Settled);
    assert_eq!(out.publish, None);
}

#[test]
fn reset_rehomes_both_target_and_position() {
    let (mut c, _plant, _clock) = encoder_at(1234, ControllerCfg::default());
    c.apply(Command::Reset);
    assert_eq!(c.position(), 700);
    assert_eq!(c.target(), 700);
    assert!(c.publish_pending());
    // The encoder offset follows the new origin.
    assert_eq!(c.tick().status, TickStatus::Settled);
    assert_eq!(c.position(), 700);
}

#[test]
fn feedback_recalibrates_without_motion() {
    let (mut c, plant, _clock) = open_loop(3200);
    c.apply(Command::Feedback(25));
    assert_eq!(c.position(), 1_037_500);
    assert_eq!(c.target(), 1_037_500);
    let out = c.tick();
    assert_eq!(out.status, TickStatus::Settled);
    assert_eq!(out.publish.map(|p| p.percent), Some(25));
    assert!(plant.moves().is_empty());
}

// Encoder preset; Feedback places the blind, SetPosition picks the target.
#[rstest]
#[case::raising_across_the_gate(20, 100, (32, 1500, 30))]
#[case::lowering_above_the_gate(90, 70, (-32, 1250, 30))]
#[case::raising_below_the_gate(20, 40, (32, 800, 90))]
#[case::closing_from_the_top(100, 0, (-32, 800, 90))]
fn encoder_preset_profile_follows_target_gate(
    #[case] from_pct: u8,
    #[case] to_pct: u8,
    #[case] expected: (i32, u32, u32),
) {
    let (mut c, plant, _clock) = encoder_at(0, ControllerCfg::default());
    c.apply(Command::Feedback(from_pct));
    c.apply(Command::SetPosition(to_pct));
    assert!(c.tick().status.executed() != 0);
    let m = plant.last_move().unwrap();
    assert_eq!((m.delta, m.current_ma, m.speed_rpm), expected);
}

#[test]
fn stop_above_the_top_clamps_target_into_travel() {
    let (mut c, plant, _clock) = encoder_at(3000, ControllerCfg::default());
    assert_eq!(c.position(), 3000);
    c.apply(Command::Stop);
    assert_eq!(c.target(), 700);
    assert!(!c.publish_pending());
    // Clamped target lies outside the deadzone, so the blind is driven back.
    assert_eq!(c.tick().status.executed(), -32);
    assert_eq!(plant.last_move().unwrap().delta, -32);
}

fn wide_deadzone() -> ControllerCfg {
    ControllerCfg {
        motion: MotionCfg {
            deadzone: 5000,
            ..MotionCfg::default()
        },
        ..ControllerCfg::default()
    }
}

#[test]
fn settle_report_uses_measured_position() {
    let (mut c, plant, _clock) = encoder_at(0, wide_deadzone());
    c.apply(Command::Feedback(50));
    assert_eq!(c.position(), -89_150);
    plant.displace(-2000);
    let p = c.tick().publish.expect("settle report");
    assert!(p.settle);
    assert_eq!(c.position(), -91_150);
    // 48.9% of travel, while the target still reads 50%.
    assert_eq!(p.percent, 49);
    assert_eq!(c.snapshot().target_percent, 50);
}

#[test]
fn settle_report_at_bottom_reads_fully_closed() {
    let (mut c, plant, _clock) = encoder_at(0, wide_deadzone());
    c.apply(Command::Feedback(0));
    plant.displace(1500);
    c.apply(Command::Close);
    let p = c.tick().publish.expect("settle report");
    assert_eq!(c.position(), -177_500);
    assert_eq!(p.percent, 0);
}

#[test]
fn move_failure_faults_and_releases_driver() {
    let (mut c, plant, _clock) = open_loop(3200);
    c.apply(Command::Feedback(0));
    c.apply(Command::Open);
    plant.fail_next_move("spi crc");
    let out = c.tick();
    assert!(matches!(out.status, TickStatus::Faulted(_)), "{out:?}");
    assert_eq!(out.publish, None);
    assert!(!plant.enabled());
    assert_eq!(c.position(), 0);
    // The loop carries on.
    assert_eq!(c.tick().status.executed(), 3200);
}

#[test]
fn encoder_failure_faults_without_moving() {
    let (mut c, plant, _clock) = encoder_at(0, ControllerCfg::default());
    plant.fail_next_angle("i2c nack");
    assert!(matches!(c.tick().status, TickStatus::Faulted(_)));
    assert!(plant.moves().is_empty());
}

#[test]
fn snapshot_renders_plain_text() {
    let (mut c, _plant, _clock) = encoder_at(650, ControllerCfg::default());
    c.tick();
    let text = c.snapshot().to_string();
    assert!(text.contains("position: 650"), "{text}");
    assert!(text.contains("protection: normal"), "{text}");
    assert!(text.contains("encoder: absolute"), "{text}");
}

#[test]
fn read_status_refreshes_driver_flags_without_moving() {
    let (mut c, plant, _clock) = open_loop(3200);
    assert_eq!(c.snapshot().actuator, None);
    plant.set_thermal_warning(true);
    let status = c.read_status().unwrap();
    assert!(status.thermal_warning);
    assert_eq!(c.snapshot().actuator, Some(status));
    assert!(plant.moves().is_empty());

    plant.fail_next_status("spi timeout");
    assert!(c.read_status().is_err());
}
