//! Tests for the organ engine

use super::*;
use crate::config::{ConsoleConfig, InstrumentConfig, StopConfig};
use crate::sink::{ConsoleSink, SinkCommand};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

fn make_instrument(soundfont: &str, stops: usize, num_stops: Option<usize>) -> InstrumentConfig {
    InstrumentConfig {
        soundfont: PathBuf::from(soundfont),
        gain: 0.5,
        num_stops,
        stops: (0..stops)
            .map(|i| StopConfig {
                patch: 10 + i as u8,
                name: format!("Stop {}", i),
            })
            .collect(),
    }
}

fn make_console(modes: Vec<(&str, InstrumentConfig)>) -> ConsoleConfig {
    let mut instruments = HashMap::new();
    let mut names = Vec::new();
    for (name, instrument) in modes {
        names.push(name.to_string());
        instruments.insert(name.to_string(), instrument);
    }
    ConsoleConfig {
        index: 0,
        topic: None,
        modes: names,
        instruments,
    }
}

/// Two manuals, "Church" with 4 stops and "Theatre" with 2
fn make_organ() -> Organ<ConsoleSink> {
    let console = make_console(vec![
        ("Church", make_instrument("church.sf2", 4, None)),
        ("Theatre", make_instrument("theatre.sf2", 2, None)),
    ]);
    Organ::new(ConsoleSink::new(), Box::new(console), 2).unwrap()
}

fn triggers(history: &[SinkCommand]) -> Vec<(u8, u8, u8)> {
    history
        .iter()
        .filter_map(|c| match *c {
            SinkCommand::Trigger { channel, note, velocity } => Some((channel, note, velocity)),
            _ => None,
        })
        .collect()
}

fn releases(history: &[SinkCommand]) -> Vec<(u8, u8)> {
    history
        .iter()
        .filter_map(|c| match *c {
            SinkCommand::Release { channel, note } => Some((channel, note)),
            _ => None,
        })
        .collect()
}

fn take(organ: &mut Organ<ConsoleSink>) -> Vec<SinkCommand> {
    organ.sink_mut().take_history()
}

#[test]
fn test_new_loads_first_mode() {
    let organ = make_organ();
    let sink = organ.sink();

    assert!(sink.is_started());
    assert_eq!(organ.mode_index(), 0);
    assert_eq!(organ.profile().mode(), "Church");
    assert_eq!(organ.stop_states(), &[false; 4]);
    assert_eq!(organ.volume(), DEFAULT_VOLUME);
    assert_eq!(organ.transpose_amount(), 0);

    assert_eq!(
        sink.history()[0],
        SinkCommand::LoadSoundfont {
            path: PathBuf::from("church.sf2"),
            gain: 0.5,
        }
    );
    for (i, channel) in CHANNELS.iter().take(4).enumerate() {
        assert_eq!(sink.program(*channel), Some((DEFAULT_BANK, 10 + i as u8)));
    }
    assert!(triggers(sink.history()).is_empty());
}

#[test]
fn test_two_manuals_same_key() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.commit();
    take(&mut organ);

    organ.key_down(0, 60);
    organ.commit();
    assert_eq!(triggers(&take(&mut organ)), vec![(0, 60, 127)]);

    organ.key_down(1, 60);
    organ.commit();
    assert!(take(&mut organ).is_empty());

    organ.key_up(0, 60);
    organ.commit();
    assert!(take(&mut organ).is_empty(), "manual 1 still holds the key");

    organ.key_up(1, 60);
    organ.commit();
    assert_eq!(releases(&take(&mut organ)), vec![(0, 60)]);
    assert!(organ.sink().sounding().is_empty());
}

#[test]
fn test_key_edge_triggers_once_per_active_stop() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.stop_on(2);
    organ.stop_on(3);
    organ.commit();
    take(&mut organ);

    organ.key_down(1, 50);
    organ.commit();
    assert_eq!(
        triggers(&take(&mut organ)),
        vec![(CHANNELS[0], 50, 127), (CHANNELS[2], 50, 127), (CHANNELS[3], 50, 127)]
    );
}

#[test]
fn test_stop_toggle_without_keys_is_silent() {
    let mut organ = make_organ();
    organ.toggle_stop(1);
    organ.commit();
    organ.toggle_stop(1);
    organ.commit();
    let history = take(&mut organ);
    assert!(history.iter().all(|c| matches!(c, SinkCommand::LoadSoundfont { .. } | SinkCommand::Program { .. })));
}

#[test]
fn test_stop_edges_voice_held_keys() {
    let mut organ = make_organ();
    organ.key_down(0, 40);
    organ.key_down(1, 52);
    organ.commit();
    take(&mut organ);

    organ.stop_on(1);
    let summary = organ.commit();
    assert_eq!(summary, CommitSummary { triggered: 2, released: 0 });
    assert_eq!(organ.sink().sounding(), vec![(1, 40), (1, 52)]);

    organ.toggle_stop(1);
    organ.commit();
    assert_eq!(releases(&take(&mut organ)), vec![(1, 40), (1, 52)]);
    assert!(organ.sink().sounding().is_empty());
}

#[test]
fn test_key_and_stop_in_same_batch_is_idempotent_at_sink() {
    let mut organ = make_organ();
    organ.key_down(0, 60);
    organ.stop_on(0);
    organ.commit();

    // Key pass and stop pass both start the note
    assert_eq!(triggers(&take(&mut organ)), vec![(0, 60, 127), (0, 60, 127)]);
    assert_eq!(organ.sink().sounding(), vec![(0, 60)]);

    organ.key_up(0, 60);
    organ.stop_off(0);
    organ.commit();
    assert!(organ.sink().sounding().is_empty());
}

#[test]
fn test_stop_off_and_key_up_in_same_batch_releases_once() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.commit();
    take(&mut organ);

    organ.stop_off(0);
    organ.key_up(0, 60);
    organ.commit();
    assert_eq!(
        take(&mut organ),
        vec![SinkCommand::Release { channel: 0, note: 60 }]
    );
    assert!(organ.sink().sounding().is_empty());
}

#[test]
fn test_all_off_takes_effect_on_commit() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.key_down(1, 64);
    organ.commit();
    take(&mut organ);

    organ.all_off();
    assert!(organ.sink().history().is_empty());
    assert_eq!(organ.sink().sounding().len(), 2);

    organ.commit();
    assert!(organ.sink().sounding().is_empty());
    assert_eq!(organ.stop_states(), &[false; 4]);
}

#[test]
fn test_out_of_range_input_is_ignored() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.stop_on(9);
    organ.key_down(5, 60);
    organ.key_down(0, 20);
    organ.key_down(0, 100);
    organ.commit();

    assert!(organ.held_keys().is_empty());
    assert!(triggers(organ.sink().history()).is_empty());
    assert_eq!(organ.stop_states(), &[true, false, false, false]);
}

#[test]
fn test_transpose_silences_then_retriggers() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.key_down(1, 67);
    organ.commit();
    take(&mut organ);

    organ.transpose(5);
    assert_eq!(releases(&take(&mut organ)), vec![(0, 60), (0, 67)]);
    assert!(organ.sink().sounding().is_empty());
    assert_eq!(organ.held_keys(), vec![60, 67], "keys stay held across transpose");

    organ.commit();
    assert_eq!(triggers(&take(&mut organ)), vec![(0, 65, 127), (0, 72, 127)]);
    assert_eq!(organ.sink().sounding(), vec![(0, 65), (0, 72)]);

    organ.key_up(0, 60);
    organ.commit();
    assert_eq!(releases(&take(&mut organ)), vec![(0, 65)]);
}

#[test]
fn test_transpose_out_of_midi_range_skips_notes() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 90);
    organ.key_down(0, 40);
    organ.transpose(40);
    let summary = organ.commit();
    assert_eq!(summary.triggered, 1);
    assert_eq!(organ.sink().sounding(), vec![(0, 80)]);

    organ.transpose(0);
    assert!(organ.sink().sounding().is_empty());
    organ.commit();
    assert_eq!(organ.sink().sounding(), vec![(0, 40), (0, 90)]);
}

#[test]
fn test_huge_transpose_skips_notes() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.commit();
    take(&mut organ);

    organ.transpose(i32::MAX);
    assert_eq!(releases(&take(&mut organ)), vec![(0, 60)]);
    let summary = organ.commit();
    assert_eq!(summary.triggered, 0);
    assert!(organ.sink().sounding().is_empty());

    organ.transpose(i32::MIN);
    assert_eq!(organ.commit().triggered, 0);

    organ.transpose(0);
    organ.commit();
    assert_eq!(organ.sink().sounding(), vec![(0, 60)]);
}

#[test]
fn test_volume_only_affects_new_notes() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.commit();
    take(&mut organ);

    organ.set_volume(64);
    organ.commit();
    assert!(take(&mut organ).is_empty());
    assert_eq!(organ.sink().velocity_of(0, 60), Some(127));

    organ.key_down(0, 62);
    organ.commit();
    assert_eq!(triggers(&take(&mut organ)), vec![(0, 62, 64)]);
    assert_eq!(organ.sink().velocity_of(0, 60), Some(127));

    organ.set_volume(200);
    assert_eq!(organ.volume(), MAX_VOLUME);
}

#[test]
fn test_set_instrument_clears_everything() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.stop_on(3);
    organ.key_down(0, 60);
    organ.commit();
    take(&mut organ);

    organ.set_instrument(1).unwrap();
    let history = take(&mut organ);
    assert_eq!(releases(&history), vec![(0, 60), (CHANNELS[3], 60)]);
    assert!(history.contains(&SinkCommand::LoadSoundfont {
        path: PathBuf::from("theatre.sf2"),
        gain: 0.5,
    }));
    assert_eq!(organ.profile().mode(), "Theatre");
    assert_eq!(organ.stop_states(), &[false, false]);
    assert!(organ.held_keys().is_empty());
    assert!(organ.sink().sounding().is_empty());

    organ.commit();
    assert!(take(&mut organ).is_empty());
}

#[test]
fn test_unknown_mode_is_not_fatal() {
    let mut organ = make_organ();
    organ.stop_on(0);
    organ.key_down(0, 60);
    organ.commit();

    let err = organ.set_instrument(7).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(organ.mode_index(), 0);
    assert_eq!(organ.sink().sounding(), vec![(0, 60)]);
}

#[test]
fn test_too_many_stops_fails_before_any_note() {
    let console = make_console(vec![("Huge", make_instrument("huge.sf2", 3, Some(20)))]);
    let err = Organ::new(ConsoleSink::new(), Box::new(console), 2)
        .err()
        .expect("construction must fail");
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        OrganError::Profile(ProfileError::TooManyStops {
            declared: 20,
            available: 15,
            ..
        })
    ));
}

#[test]
fn test_new_without_modes_is_fatal() {
    let console = make_console(vec![]);
    let err = Organ::new(ConsoleSink::new(), Box::new(console), 2)
        .err()
        .expect("construction must fail");
    assert!(err.is_fatal());
    assert!(matches!(err, OrganError::Profile(ProfileError::NoModes)));
}

#[test]
fn test_switch_to_oversized_mode_is_fatal() {
    let console = make_console(vec![
        ("Small", make_instrument("small.sf2", 2, None)),
        ("Huge", make_instrument("huge.sf2", 16, None)),
    ]);
    let mut organ = Organ::new(ConsoleSink::new(), Box::new(console), 1).unwrap();
    let err = organ.set_instrument(1).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_shutdown_silences_and_stops_sink() {
    let mut organ = make_organ();
    organ.stop_on(2);
    organ.key_down(1, 70);
    organ.commit();

    organ.shutdown().unwrap();
    assert!(organ.sink().sounding().is_empty());
    assert!(!organ.sink().is_started());
}

#[derive(Debug, Clone)]
enum Op {
    Down(usize, u8),
    Up(usize, u8),
    StopOn(usize),
    StopOff(usize),
    Toggle(usize),
    Transpose(i32),
    Volume(u8),
    Commit,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 30u8..100).prop_map(|(m, k)| Op::Down(m, k)),
        (0usize..3, 30u8..100).prop_map(|(m, k)| Op::Up(m, k)),
        (0usize..5).prop_map(Op::StopOn),
        (0usize..5).prop_map(Op::StopOff),
        (0usize..5).prop_map(Op::Toggle),
        (-40i32..40).prop_map(Op::Transpose),
        any::<u8>().prop_map(Op::Volume),
        Just(Op::Commit),
    ]
}

/// What should be sounding after a commit: every drawn stop on every held key
fn expected_sounding(organ: &Organ<ConsoleSink>) -> BTreeSet<(u8, u8)> {
    let mut expected = BTreeSet::new();
    for stop in organ.profile().stops() {
        if !organ.stop_states()[stop.index] {
            continue;
        }
        for key in organ.sounding_keys() {
            let note = key as i32 + organ.transpose_amount();
            if (0..128).contains(&note) {
                expected.insert((stop.channel, note as u8));
            }
        }
    }
    expected
}

proptest! {
    #[test]
    fn prop_sink_matches_state_after_every_commit(ops in proptest::collection::vec(op(), 0..60)) {
        let mut organ = make_organ();
        for op in ops {
            match op {
                Op::Down(m, k) => organ.key_down(m, k),
                Op::Up(m, k) => organ.key_up(m, k),
                Op::StopOn(s) => organ.stop_on(s),
                Op::StopOff(s) => organ.stop_off(s),
                Op::Toggle(s) => organ.toggle_stop(s),
                Op::Transpose(t) => organ.transpose(t),
                Op::Volume(v) => organ.set_volume(v),
                Op::Commit => {
                    organ.commit();
                    let sounding: BTreeSet<_> = organ.sink().sounding().into_iter().collect();
                    prop_assert_eq!(sounding, expected_sounding(&organ));
                }
            }
        }
        organ.all_off();
        organ.commit();
        prop_assert!(organ.sink().sounding().is_empty());
    }
}
