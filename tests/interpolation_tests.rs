//! Parametric Mixer Tests
//!
//! Tests for:
//! - Linear bracketing, clamping and speed extrapolation
//! - Cartesian and Directional gradient band weights
//! - Weight normalization and the nearest-threshold fallback
//! - Duplicate and unsorted threshold rejection
//! - Dirty-flag scheduling and idempotent parameter writes
//! - Failure isolation between mixers in one frame
//! - Thresholds carried by children moved within a mixer
//! - Parameter validation (kind, finiteness, atomic bulk assignment)

use glam::Vec2;

use myth_blend::{BlendError, BlendParameter, ClipNode, MixerKind, NodeId, PlaybackGraph};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn mixer_with_children(kind: MixerKind, count: usize) -> (PlaybackGraph, NodeId, Vec<NodeId>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut graph = PlaybackGraph::new();
    let mixer = graph.create_mixer(kind);
    let children = (0..count)
        .map(|i| {
            let child = graph.create_clip(ClipNode::new(format!("clip{i}"), 1.0)).unwrap();
            graph.add_child(mixer, child).unwrap();
            child
        })
        .collect();
    (graph, mixer, children)
}

fn weights(graph: &PlaybackGraph, children: &[NodeId]) -> Vec<f32> {
    children.iter().map(|&c| graph.weight(c).unwrap()).collect()
}

fn assert_weights(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!(approx(*a, *e), "Expected {expected:?}, got {actual:?}");
    }
}

fn assert_normalized(actual: &[f32]) {
    let sum: f32 = actual.iter().sum();
    assert!(approx(sum, 1.0), "Weights {actual:?} sum to {sum}");
    for w in actual {
        assert!((0.0..=1.0 + EPSILON).contains(w), "Weight {w} outside [0, 1]");
    }
}

const LINEAR: MixerKind = MixerKind::Linear {
    extrapolate_speed: false,
};

// ============================================================================
// Linear
// ============================================================================

#[test]
fn linear_brackets_parameter() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 3);
    graph.set_thresholds(mixer, [0.0_f32, 1.0, 2.0]).unwrap();

    graph.set_parameter(mixer, 0.5_f32).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.5, 0.5, 0.0]);

    graph.set_parameter(mixer, 1.75_f32).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.0, 0.25, 0.75]);
}

#[test]
fn linear_clamps_outside_range() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 3);
    graph.set_thresholds(mixer, [0.0_f32, 1.0, 2.0]).unwrap();

    graph.set_parameter(mixer, -1.0_f32).unwrap();
    graph.pre_evaluate(0.0).unwrap();
    assert_weights(&weights(&graph, &children), &[1.0, 0.0, 0.0]);

    graph.set_parameter(mixer, 3.0_f32).unwrap();
    graph.pre_evaluate(0.0).unwrap();
    assert_weights(&weights(&graph, &children), &[0.0, 0.0, 1.0]);
    assert!(approx(graph.effective_speed(mixer).unwrap(), 1.0));
}

#[test]
fn linear_extrapolates_speed_above_range() {
    let kind = MixerKind::Linear {
        extrapolate_speed: true,
    };
    let (mut graph, mixer, _) = mixer_with_children(kind, 2);
    graph.set_thresholds(mixer, [0.0_f32, 2.0]).unwrap();

    graph.set_parameter(mixer, 3.0_f32).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert!(approx(graph.effective_speed(mixer).unwrap(), 1.5));

    graph.set_parameter(mixer, 1.0_f32).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert!(approx(graph.effective_speed(mixer).unwrap(), 1.0));
}

#[test]
fn linear_rejects_unsorted_thresholds() {
    let (mut graph, mixer, _) = mixer_with_children(LINEAR, 3);
    graph.set_thresholds(mixer, [0.0_f32, 2.0, 1.0]).unwrap();

    let err = graph.resolve_weights(mixer).unwrap_err();
    assert_eq!(
        err,
        BlendError::UnsortedThresholds {
            index: 2,
            value: 1.0,
            previous: 2.0
        }
    );
    assert!(graph.weights_dirty(mixer).unwrap());
}

#[test]
fn thresholds_follow_children_on_removal() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 3);
    graph.set_thresholds(mixer, [0.0_f32, 1.0, 2.0]).unwrap();

    graph.remove_child(mixer, children[1]).unwrap();

    assert_eq!(graph.threshold(mixer, 0).unwrap(), BlendParameter::Scalar(0.0));
    assert_eq!(graph.threshold(mixer, 1).unwrap(), BlendParameter::Scalar(2.0));
    assert!(matches!(graph.threshold(mixer, 2), Err(BlendError::IndexOutOfRange { index: 2, count: 2 })));
}

#[test]
fn failing_mixer_does_not_stall_the_frame() {
    let (mut graph, bad, bad_children) = mixer_with_children(LINEAR, 2);
    graph.set_thresholds(bad, [0.0_f32, -1.0]).unwrap();

    let good = graph.create_mixer(LINEAR);
    let good_children: Vec<NodeId> = (0..2)
        .map(|i| {
            let child = graph.create_clip(ClipNode::new(format!("good{i}"), 1.0)).unwrap();
            graph.add_child(good, child).unwrap();
            child
        })
        .collect();
    graph.set_thresholds(good, [0.0_f32, 1.0]).unwrap();
    graph.set_parameter(good, 0.25_f32).unwrap();

    let err = graph.update(0.5).unwrap_err();
    assert_eq!(
        err,
        BlendError::UnsortedThresholds {
            index: 1,
            value: -1.0,
            previous: 0.0
        }
    );

    assert!(graph.weights_dirty(bad).unwrap());
    assert!(!graph.weights_dirty(good).unwrap());
    assert_weights(&weights(&graph, &good_children), &[0.75, 0.25]);
    for &child in good_children.iter().chain(&bad_children) {
        assert!((graph.time(child).unwrap() - 0.5).abs() < 1e-6, "Time did not advance");
    }
}

#[test]
fn removal_down_to_one_child_keeps_blending() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 2);
    graph.set_thresholds(mixer, [0.0_f32, 1.0]).unwrap();
    graph.set_parameter(mixer, 0.5_f32).unwrap();

    graph.remove_child(mixer, children[0]).unwrap();
    graph.resolve_weights(mixer).unwrap();

    assert_eq!(graph.child_count(mixer).unwrap(), 1);
    assert!(approx(graph.weight(children[1]).unwrap(), 1.0));
}

#[test]
fn moved_child_keeps_its_threshold() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Cartesian, 3);
    graph
        .set_thresholds(mixer, [Vec2::ZERO, Vec2::X, Vec2::Y])
        .unwrap();

    // Two children remain once it is detached, so slot 2 appends.
    graph.set_child(mixer, 2, children[0]).unwrap();

    assert_eq!(graph.child(mixer, 2).unwrap(), children[0]);
    assert_eq!(graph.threshold(mixer, 0).unwrap(), BlendParameter::Vector(Vec2::X));
    assert_eq!(graph.threshold(mixer, 1).unwrap(), BlendParameter::Vector(Vec2::Y));
    assert_eq!(graph.threshold(mixer, 2).unwrap(), BlendParameter::Vector(Vec2::ZERO));

    graph.set_parameter(mixer, Vec2::ZERO).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[1.0, 0.0, 0.0]);
}

#[test]
fn add_child_with_threshold_validates_first() {
    let (mut graph, mixer, _) = mixer_with_children(LINEAR, 0);
    let clip = graph.create_clip(ClipNode::new("a", 1.0)).unwrap();

    let err = graph.add_child_with_threshold(mixer, clip, f32::NAN).unwrap_err();
    assert!(matches!(err, BlendError::NonFiniteValue { .. }));
    assert_eq!(graph.child_count(mixer).unwrap(), 0);

    assert_eq!(graph.add_child_with_threshold(mixer, clip, 0.5_f32).unwrap(), 0);
    assert_eq!(graph.threshold(mixer, 0).unwrap(), BlendParameter::Scalar(0.5));
}

// ============================================================================
// Cartesian
// ============================================================================

fn cross_thresholds() -> [Vec2; 5] {
    [
        Vec2::ZERO,
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, -1.0),
    ]
}

#[test]
fn cartesian_threshold_hit_gets_full_weight() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Cartesian, 5);
    graph.set_thresholds(mixer, cross_thresholds()).unwrap();

    graph.set_parameter(mixer, Vec2::new(1.0, 0.0)).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.0, 1.0, 0.0, 0.0, 0.0]);

    graph.set_parameter(mixer, Vec2::ZERO).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[1.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn cartesian_weights_are_normalized() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Cartesian, 5);
    graph.set_thresholds(mixer, cross_thresholds()).unwrap();

    for parameter in [
        Vec2::new(0.3, 0.4),
        Vec2::new(-0.7, 0.1),
        Vec2::new(0.5, -0.5),
        Vec2::new(3.0, 3.0),
    ] {
        graph.set_parameter(mixer, parameter).unwrap();
        graph.resolve_weights(mixer).unwrap();
        assert_normalized(&weights(&graph, &children));
    }
}

#[test]
fn cartesian_midpoint_splits_evenly() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Cartesian, 2);
    graph
        .set_thresholds(mixer, [Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0)])
        .unwrap();

    graph.set_parameter(mixer, Vec2::new(1.0, 0.0)).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.5, 0.5]);
}

#[test]
fn cartesian_rejects_duplicate_thresholds() {
    let (mut graph, mixer, _) = mixer_with_children(MixerKind::Cartesian, 3);
    graph
        .set_thresholds(mixer, [Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)])
        .unwrap();

    let err = graph.resolve_weights(mixer).unwrap_err();
    assert_eq!(
        err,
        BlendError::DuplicateThreshold {
            first: 1,
            second: 2,
            x: 1.0,
            y: 1.0
        }
    );
}

// ============================================================================
// Directional
// ============================================================================

#[test]
fn directional_threshold_hit_gets_full_weight() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Directional, 5);
    graph.set_thresholds(mixer, cross_thresholds()).unwrap();

    graph.set_parameter(mixer, Vec2::new(0.0, 1.0)).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.0, 0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn directional_blends_along_radius() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Directional, 2);
    graph.set_thresholds(mixer, [Vec2::ZERO, Vec2::new(0.0, 1.0)]).unwrap();

    graph.set_parameter(mixer, Vec2::new(0.0, 0.5)).unwrap();
    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.5, 0.5]);
}

#[test]
fn directional_weights_are_normalized() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Directional, 5);
    graph.set_thresholds(mixer, cross_thresholds()).unwrap();

    for parameter in [Vec2::new(0.3, 0.4), Vec2::new(-0.7, 0.7), Vec2::new(0.0, -2.0)] {
        graph.set_parameter(mixer, parameter).unwrap();
        graph.resolve_weights(mixer).unwrap();
        assert_normalized(&weights(&graph, &children));
    }
}

#[test]
fn directional_rejects_duplicate_thresholds() {
    let (mut graph, mixer, _) = mixer_with_children(MixerKind::Directional, 2);
    graph
        .set_thresholds(mixer, [Vec2::new(0.0, 1.0), Vec2::new(0.0, 1.0)])
        .unwrap();

    let err = graph.resolve_weights(mixer).unwrap_err();
    assert!(matches!(err, BlendError::DuplicateThreshold { first: 0, second: 1, .. }));
}

// ============================================================================
// Dirty Scheduling
// ============================================================================

#[test]
fn parameter_write_marks_dirty_once() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 2);
    graph.set_thresholds(mixer, [0.0_f32, 1.0]).unwrap();
    assert!(graph.weights_dirty(mixer).unwrap());

    graph.pre_evaluate(0.016).unwrap();
    assert!(!graph.weights_dirty(mixer).unwrap());

    graph.set_parameter(mixer, 0.0_f32).unwrap();
    assert!(!graph.weights_dirty(mixer).unwrap(), "Writing the current value must not dirty weights");

    graph.set_parameter(mixer, 0.2_f32).unwrap();
    graph.set_parameter(mixer, 0.4_f32).unwrap();
    assert!(graph.weights_dirty(mixer).unwrap());

    graph.pre_evaluate(0.016).unwrap();
    assert!(!graph.weights_dirty(mixer).unwrap());
    assert_weights(&weights(&graph, &children), &[0.6, 0.4]);

    graph.resolve_weights(mixer).unwrap();
    assert_weights(&weights(&graph, &children), &[0.6, 0.4]);
}

#[test]
fn structural_changes_mark_dirty() {
    let (mut graph, mixer, children) = mixer_with_children(LINEAR, 2);
    graph.set_thresholds(mixer, [0.0_f32, 1.0]).unwrap();
    graph.resolve_weights(mixer).unwrap();

    graph.set_threshold(mixer, 1, 2.0_f32).unwrap();
    assert!(graph.weights_dirty(mixer).unwrap());
    graph.resolve_weights(mixer).unwrap();

    graph.remove_child(mixer, children[1]).unwrap();
    assert!(graph.weights_dirty(mixer).unwrap());
}

// ============================================================================
// Parameter Validation
// ============================================================================

#[test]
fn parameter_rejects_wrong_kind_and_non_finite() {
    let (mut graph, mixer, _) = mixer_with_children(LINEAR, 2);
    graph.set_parameter(mixer, 0.5_f32).unwrap();

    let err = graph.set_parameter(mixer, Vec2::ONE).unwrap_err();
    assert!(matches!(err, BlendError::ParameterKindMismatch { .. }));

    let err = graph.set_parameter(mixer, f32::NAN).unwrap_err();
    assert!(matches!(err, BlendError::NonFiniteValue { .. }));

    assert_eq!(graph.parameter(mixer).unwrap(), BlendParameter::Scalar(0.5));
}

#[test]
fn bulk_thresholds_are_atomic() {
    let (mut graph, mixer, _) = mixer_with_children(MixerKind::Cartesian, 2);
    graph.set_thresholds(mixer, [Vec2::ZERO, Vec2::X]).unwrap();

    let err = graph
        .set_thresholds(mixer, [Vec2::Y, Vec2::new(f32::INFINITY, 0.0)])
        .unwrap_err();
    assert!(matches!(err, BlendError::NonFiniteValue { .. }));
    assert_eq!(graph.threshold(mixer, 0).unwrap(), BlendParameter::Vector(Vec2::ZERO));

    let err = graph.set_thresholds(mixer, [Vec2::ZERO, Vec2::X, Vec2::Y]).unwrap_err();
    assert!(matches!(err, BlendError::IndexOutOfRange { .. }));
}

#[test]
fn manual_mixer_has_no_parameter() {
    let (mut graph, mixer, children) = mixer_with_children(MixerKind::Manual, 2);
    assert_eq!(graph.set_parameter(mixer, 1.0_f32).unwrap_err(), BlendError::NotParametric(mixer));

    graph.set_weight(children[0], 0.3).unwrap();
    graph.pre_evaluate(0.0).unwrap();
    assert!(approx(graph.weight(children[0]).unwrap(), 0.3));
}
