use std::sync::{Arc, Mutex};

use vrinteract::activation::{ActivationEvent, ActivationMode, HapticSink, PointerConfig, TracingHapticSink};
use vrinteract::controller::{
    Axis2, ButtonSampler, ControllerHandle, EdgeKind, LogicalButton, RawSample, SamplerSettings,
};
use vrinteract::interaction::{
    CandidateConfig, CandidateId, CapacityPolicy, InteractionEvent, OverlapSource, Rejection,
    Request, ZoneConfig, ZoneId,
};
use vrinteract::mapping::{AliasSignal, ButtonAlias};
use vrinteract::{FrameReport, InteractionConfig, InteractionSystem};

const LEFT: ControllerHandle = ControllerHandle::left(0);
const RIGHT: ControllerHandle = ControllerHandle::right(1);
const CUBE: CandidateId = CandidateId(1);
const DT: f32 = 0.25;

fn system(config: InteractionConfig) -> InteractionSystem {
    let mut system = InteractionSystem::new(config, Box::new(TracingHapticSink)).unwrap();
    system.connect_controller(LEFT);
    system.connect_controller(RIGHT);
    system
}

fn cube_config() -> InteractionConfig {
    InteractionConfig {
        candidates: vec![CandidateConfig::grabbable(CUBE)],
        ..Default::default()
    }
}

fn grip(system: &mut InteractionSystem, controller: ControllerHandle, pressed: bool) {
    let sample = if pressed {
        RawSample::pressed()
    } else {
        RawSample::released()
    };
    system.report_button_sample(controller, LogicalButton::Grip, sample);
}

fn count(report: &FrameReport, wanted: impl Fn(&InteractionEvent) -> bool) -> usize {
    report.interactions().filter(|event| wanted(event)).count()
}

#[test]
fn repeated_samples_fire_each_edge_once() {
    let mut system = system(cube_config());
    let mut downs = 0;
    let mut ups = 0;
    for pressed in [true, true, true, true, false, false, false] {
        grip(&mut system, RIGHT, pressed);
        let report = system.tick(DT);
        for event in report.aliases() {
            if event.alias == ButtonAlias::GrabAction && event.activation {
                match event.signal {
                    AliasSignal::Down => downs += 1,
                    AliasSignal::Up => ups += 1,
                    AliasSignal::Axis { .. } => {}
                }
            }
        }
    }
    assert_eq!((downs, ups), (1, 1));
}

#[test]
fn axis_changes_respect_the_deadzone() {
    let mut sampler = ButtonSampler::new(SamplerSettings::default());
    sampler.connect(RIGHT);
    let mut reported = Vec::new();
    for x in [0.01, 0.03, -0.02, 0.5, 0.5, 0.6, 0.6] {
        let sample = RawSample::new(false, true, Axis2::new(x, 0.0));
        for edge in sampler.update(RIGHT, LogicalButton::Touchpad, sample) {
            if let EdgeKind::AxisChanged { value, .. } = edge.kind {
                reported.push(value.x);
            }
        }
    }
    assert_eq!(reported, vec![0.5, 0.6]);
}

#[test]
fn two_controllers_never_grab_the_same_candidate() {
    let mut system = system(cube_config());
    for controller in [LEFT, RIGHT] {
        system.report_overlap_enter(OverlapSource::Contact(controller), CUBE);
        grip(&mut system, controller, true);
    }
    let report = system.tick(DT);

    assert_eq!(
        count(&report, |event| matches!(event, InteractionEvent::Grabbed { .. })),
        1
    );
    assert_eq!(system.arbiter().grabbed_by(CUBE), Some(LEFT));
    assert!(report.interactions().any(|event| matches!(
        event,
        InteractionEvent::TransitionRejected {
            reason: Rejection::ConflictingOwnership { holder: LEFT },
            ..
        }
    )));
}

fn snap_after_entering(order: [ZoneId; 2]) -> Option<ZoneId> {
    let mut config = cube_config();
    config.zones = vec![
        ZoneConfig::new(ZoneId(1), CapacityPolicy::Single),
        ZoneConfig::new(ZoneId(2), CapacityPolicy::Single),
    ];
    let mut system = system(config);
    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    grip(&mut system, RIGHT, true);
    system.tick(DT);

    for zone in order {
        system.report_overlap_enter(OverlapSource::Zone(zone), CUBE);
    }
    system.tick(DT);

    grip(&mut system, RIGHT, false);
    system.tick(DT);
    system.arbiter().snapped_zone(CUBE)
}

#[test]
fn release_picks_the_most_recently_entered_zone() {
    for _ in 0..3 {
        assert_eq!(snap_after_entering([ZoneId(1), ZoneId(2)]), Some(ZoneId(2)));
        assert_eq!(snap_after_entering([ZoneId(2), ZoneId(1)]), Some(ZoneId(1)));
    }
}

#[test]
fn stackable_zone_round_trips_in_lifo_order() {
    let coins: Vec<CandidateConfig> = (1..=4)
        .map(|id| CandidateConfig::grabbable(CandidateId(id)).with_stack_identity("coin"))
        .collect();
    let config = InteractionConfig {
        candidates: coins,
        zones: vec![ZoneConfig::new(ZoneId(7), CapacityPolicy::Stackable)],
        ..Default::default()
    };
    let mut system = system(config);
    for id in 1..=4 {
        system.request(Request::ForceSnap {
            zone: ZoneId(7),
            candidate: CandidateId(id),
        });
    }
    system.tick(DT);
    assert_eq!(system.arbiter().zone(ZoneId(7)).map(|zone| zone.depth()), Some(4));

    let mut removed = Vec::new();
    for _ in 0..4 {
        system.request(Request::Unsnap { zone: ZoneId(7) });
        let report = system.tick(DT);
        for event in report.interactions() {
            if let InteractionEvent::Unsnapped { candidate, .. } = event {
                removed.push(*candidate);
            }
        }
    }
    assert_eq!(
        removed,
        vec![CandidateId(4), CandidateId(3), CandidateId(2), CandidateId(1)]
    );
    assert_eq!(system.arbiter().zone(ZoneId(7)).map(|zone| zone.depth()), Some(0));
    assert_eq!(system.arbiter().zone(ZoneId(7)).and_then(|zone| zone.occupant()), None);
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<(ControllerHandle, f32)>>>);

impl HapticSink for RecordingSink {
    fn pulse(&mut self, controller: ControllerHandle, strength: f32) {
        self.0.lock().unwrap().push((controller, strength));
    }
}

#[test]
fn new_haptic_schedule_cancels_the_old_one() {
    let sink = RecordingSink::default();
    let mut system = InteractionSystem::new(cube_config(), Box::new(sink.clone())).unwrap();
    system.connect_controller(RIGHT);

    let old = system.request_haptic_pulse(RIGHT, 0.2, 5.0, 0.1);
    system.tick(0.1);
    system.tick(0.1);
    let new = system.request_haptic_pulse(RIGHT, 0.9, 0.5, 0.1);
    assert!(old.is_cancelled());
    assert!(!new.is_cancelled());
    let before = sink.0.lock().unwrap().len();

    let mut reported = 0;
    for _ in 0..20 {
        let report = system.tick(0.1);
        reported += report
            .activations()
            .filter(|event| matches!(event, ActivationEvent::HapticPulse(_)))
            .count();
    }

    let pulses = sink.0.lock().unwrap();
    assert!(before > 0);
    assert!(pulses.len() > before);
    assert_eq!(reported, pulses.len() - before);
    assert!(pulses[before..]
        .iter()
        .all(|(controller, strength)| *controller == RIGHT && (*strength - 0.9).abs() < 1e-6));
}

#[test]
fn grip_in_the_touching_frame_grabs_once_and_never_uses() {
    let mut system = system(cube_config());
    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    grip(&mut system, RIGHT, true);
    let report = system.tick(DT);

    let touched = report
        .interactions()
        .position(|event| matches!(event, InteractionEvent::Touched { .. }));
    let grabbed = report
        .interactions()
        .position(|event| matches!(event, InteractionEvent::Grabbed { .. }));
    assert!(touched.is_some() && touched < grabbed);
    assert_eq!(
        count(&report, |event| matches!(event, InteractionEvent::Grabbed { .. })),
        1
    );
    assert_eq!(
        count(&report, |event| matches!(event, InteractionEvent::Used { .. })),
        0
    );
    assert_eq!(system.arbiter().grabbed_by(CUBE), Some(RIGHT));
}

#[test]
fn toggle_pointer_flips_on_each_press() {
    let config = InteractionConfig {
        pointers: vec![PointerConfig::new(RIGHT, ActivationMode::ToggleButton)],
        ..cube_config()
    };
    let mut system = system(config);
    assert!(!system.pointer_active(RIGHT));

    let mut states = Vec::new();
    for _ in 0..3 {
        system.report_button_sample(RIGHT, LogicalButton::Touchpad, RawSample::pressed());
        system.tick(DT);
        states.push(system.pointer_active(RIGHT));
        system.report_button_sample(RIGHT, LogicalButton::Touchpad, RawSample::released());
        system.tick(DT);
    }
    assert_eq!(states, vec![true, false, true]);
}

fn synthetic_clicks(report: &FrameReport) -> usize {
    count(report, |event| {
        matches!(event, InteractionEvent::Clicked { synthetic: true, .. })
    })
}

#[test]
fn hover_clicks_once_after_the_dwell_time() {
    let config = InteractionConfig {
        pointers: vec![
            PointerConfig::new(RIGHT, ActivationMode::AlwaysOn).with_click_after_hover(1.0),
        ],
        candidates: vec![CandidateConfig::new(CUBE)],
        ..Default::default()
    };
    let mut system = system(config);

    system.report_pointer_hover(RIGHT, Some(CUBE));
    let mut clicked_at = Vec::new();
    for frame in 1..=12 {
        let report = system.tick(DT);
        for _ in 0..synthetic_clicks(&report) {
            clicked_at.push(frame as f32 * DT);
        }
    }
    assert_eq!(clicked_at.len(), 1);
    assert!(clicked_at[0] >= 1.0);

    system.report_pointer_hover(RIGHT, None);
    system.tick(DT);
    system.report_pointer_hover(RIGHT, Some(CUBE));
    let mut again = 0;
    for _ in 0..8 {
        again += synthetic_clicks(&system.tick(DT));
    }
    assert_eq!(again, 1);
}

#[test]
fn clone_zone_requests_a_single_copy() {
    let mut config = cube_config();
    config.zones =
        vec![ZoneConfig::new(ZoneId(3), CapacityPolicy::CloneOnSnap).with_default_occupant(CUBE)];
    let mut system = system(config);

    let mut clones = 0;
    let mut tick = |system: &mut InteractionSystem| {
        let report = system.tick(DT);
        clones += count(&report, |event| {
            matches!(event, InteractionEvent::CloneRequested { .. })
        });
    };

    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    grip(&mut system, RIGHT, true);
    tick(&mut system);
    assert_eq!(system.arbiter().grabbed_by(CUBE), Some(RIGHT));

    // Re-touch while still holding
    system.report_overlap_exit(OverlapSource::Contact(RIGHT), CUBE);
    tick(&mut system);
    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    tick(&mut system);
    grip(&mut system, RIGHT, false);
    tick(&mut system);
    grip(&mut system, RIGHT, true);
    tick(&mut system);

    assert_eq!(clones, 1);
}

#[test]
fn clone_zone_refills_from_the_host_copy() {
    let mut config = cube_config();
    config.zones =
        vec![ZoneConfig::new(ZoneId(3), CapacityPolicy::CloneOnSnap).with_default_occupant(CUBE)];
    let mut system = system(config);
    let copy = CandidateId(99);

    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    grip(&mut system, RIGHT, true);
    let report = system.tick(DT);
    assert!(report.interactions().any(|event| matches!(
        event,
        InteractionEvent::CloneRequested { source, .. } if *source == CUBE
    )));

    system.request(Request::CompleteClone {
        zone: ZoneId(3),
        clone: copy,
    });
    let report = system.tick(DT);
    assert_eq!(
        count(&report, |event| matches!(
            event,
            InteractionEvent::TransitionRejected { .. }
        )),
        0
    );
    let zone = system.arbiter().zone(ZoneId(3));
    assert_eq!(zone.and_then(|zone| zone.occupant()), Some(copy));
    assert_eq!(zone.and_then(|zone| zone.awaiting_clone()), None);

    // The copy behaves like the original, including its own clone request
    grip(&mut system, RIGHT, false);
    system.report_overlap_exit(OverlapSource::Contact(RIGHT), CUBE);
    system.tick(DT);
    system.report_overlap_enter(OverlapSource::Contact(RIGHT), copy);
    grip(&mut system, RIGHT, true);
    let report = system.tick(DT);
    assert_eq!(system.arbiter().grabbed_by(copy), Some(RIGHT));
    assert!(report.interactions().any(|event| matches!(
        event,
        InteractionEvent::CloneRequested { source, .. } if *source == copy
    )));
}

#[test]
fn letting_go_inside_the_zone_snaps_back() {
    let mut config = cube_config();
    config.zones =
        vec![ZoneConfig::new(ZoneId(5), CapacityPolicy::Single).with_default_occupant(CUBE)];
    let mut system = system(config);
    system.report_overlap_enter(OverlapSource::Zone(ZoneId(5)), CUBE);
    system.report_overlap_enter(OverlapSource::Contact(RIGHT), CUBE);
    grip(&mut system, RIGHT, true);
    system.tick(DT);
    assert_eq!(system.arbiter().grabbed_by(CUBE), Some(RIGHT));

    grip(&mut system, RIGHT, false);
    let report = system.tick(DT);
    assert_eq!(system.arbiter().snapped_zone(CUBE), Some(ZoneId(5)));
    assert!(report.interactions().any(|event| matches!(
        event,
        InteractionEvent::Snapped { zone, controller: Some(_), .. } if *zone == ZoneId(5)
    )));
}

#[test]
fn host_spawned_candidates_can_be_grabbed() {
    let mut system = system(InteractionConfig::default());
    let ball = CandidateId(7);
    system.request(Request::RegisterCandidate {
        config: CandidateConfig::grabbable(ball),
    });
    system.tick(DT);

    system.report_overlap_enter(OverlapSource::Contact(LEFT), ball);
    grip(&mut system, LEFT, true);
    system.tick(DT);
    assert_eq!(system.arbiter().grabbed_by(ball), Some(LEFT));
}
