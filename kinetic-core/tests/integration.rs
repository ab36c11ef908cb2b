//! Integration Tests for the Expression Runtime
//!
//! These tests verify that cells, expressions, the graph, event binding,
//! and animation drivers work together correctly, exercising the same
//! shapes gesture-driven hosts build.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use kinetic_core::event::gesture_state;
use kinetic_core::{
    interpolate, with_offset, AnimationDriver, DriverConfig, Easing, EventBinder, Expr,
    ExpressionGraph, FieldMap, Sample, SpringConfig, ValueCell,
};

/// A pan gesture toggling an "active" flag through a cond root.
#[test]
fn gesture_state_drives_cond_root() {
    let graph = ExpressionGraph::new();
    let state = ValueCell::bridged(gesture_state::UNDETERMINED);
    let pan_active = ValueCell::new(0.0);

    let root = Expr::set(
        &pan_active,
        Expr::cond(
            Expr::cell(&state).eq(gesture_state::ACTIVE),
            1.0,
            0.0,
        ),
    );
    let handle = graph.attach(&root).unwrap();
    assert_eq!(pan_active.read(), 0.0);

    let handler = EventBinder::bind(FieldMap::new().map("state", &state));

    handler
        .handle(&Sample::new().with("state", gesture_state::BEGAN))
        .unwrap();
    assert_eq!(pan_active.read(), 0.0);

    handler
        .handle(&Sample::new().with("state", gesture_state::ACTIVE))
        .unwrap();
    assert_eq!(pan_active.read(), 1.0);

    handler
        .handle(&Sample::new().with("state", gesture_state::END))
        .unwrap();
    assert_eq!(pan_active.read(), 0.0);

    graph.detach(&handle);
}

/// Dragging twice accumulates position through the offset cell.
#[test]
fn drag_accumulates_across_gestures() {
    let graph = ExpressionGraph::new();
    let state = ValueCell::bridged(gesture_state::UNDETERMINED);
    let translation = ValueCell::bridged(0.0);
    let offset = ValueCell::new(0.0);
    let position = ValueCell::new(0.0);

    let root = Expr::set(&position, with_offset(&state, &translation, &offset));
    let _handle = graph.attach(&root).unwrap();

    // Gesture hosts deliver movement and state transitions as separate
    // event streams.
    let on_move = EventBinder::bind(FieldMap::new().map("translationY", &translation));
    let on_state = EventBinder::bind(FieldMap::new().map("state", &state));

    // First drag: down 40, release.
    on_state
        .handle(&Sample::new().with("state", gesture_state::ACTIVE))
        .unwrap();
    on_move
        .handle(&Sample::new().with("translationY", 40.0))
        .unwrap();
    assert_eq!(position.read(), 40.0);

    on_state
        .handle(&Sample::new().with("state", gesture_state::END))
        .unwrap();
    assert_eq!(offset.read(), 40.0);
    assert_eq!(position.read(), 40.0);

    // Second drag: up 15 from where the first one ended.
    on_state
        .handle(&Sample::new().with("state", gesture_state::ACTIVE))
        .unwrap();
    on_move
        .handle(&Sample::new().with("translationY", -15.0))
        .unwrap();
    assert_eq!(position.read(), 25.0);
}

/// A nested scroll sample routed into a cell that feeds an interpolation.
#[test]
fn scroll_offset_feeds_interpolation() {
    let graph = ExpressionGraph::new();
    let scroll_y = ValueCell::bridged(0.0);
    let opacity = ValueCell::new(0.0);

    // Fade in over the first 120 points of scroll.
    let root = Expr::set(
        &opacity,
        interpolate(&scroll_y, &[0.0, 120.0], &[0.0, 1.0]),
    );
    let _handle = graph.attach(&root).unwrap();
    assert_eq!(opacity.read(), 0.0);

    let handler = EventBinder::bind(FieldMap::new().map("contentOffset.y", &scroll_y));
    let sample =
        Sample::from_json(r#"{"contentOffset": {"x": 0.0, "y": 60.0}}"#).unwrap();
    handler.handle(&sample).unwrap();

    assert_eq!(opacity.read(), 0.5);
}

/// A timing animation pulls a cell to its destination while the graph
/// mirrors every frame, and completion fires exactly once.
#[test]
fn timing_driver_feeds_graph_per_frame() {
    let graph = ExpressionGraph::new();
    let driver = AnimationDriver::new();
    let progress = ValueCell::new(0.0);
    let mirrored = ValueCell::new(0.0);
    let frames = Arc::new(AtomicI32::new(0));

    let frames_clone = frames.clone();
    let root = Expr::block([
        Expr::set(&mirrored, Expr::cell(&progress) * 2.0),
        Expr::call(&[], move |_| {
            frames_clone.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        }),
    ]);
    let _handle = graph.attach(&root).unwrap();

    let completions = Arc::new(AtomicI32::new(0));
    let completions_clone = completions.clone();
    driver.start(
        &progress,
        DriverConfig::timing(50.0, 0.3, Easing::ease_in_out()),
        move || {
            completions_clone.fetch_add(1, Ordering::SeqCst);
        },
    );

    // Three 100ms frames cover the 300ms duration; the rest are idle.
    for _ in 0..6 {
        driver.tick(0.1).unwrap();
    }

    assert_eq!(progress.read(), 50.0);
    assert_eq!(mirrored.read(), 100.0);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    // Initial evaluation plus one per animation frame.
    assert_eq!(frames.load(Ordering::SeqCst), 1 + 3);
}

/// A spring release animation lands exactly on target.
#[test]
fn spring_driver_settles_graph_exactly() {
    let graph = ExpressionGraph::new();
    let driver = AnimationDriver::new();
    let position = ValueCell::new(200.0);
    let translated = ValueCell::new(0.0);

    let _handle = graph
        .attach(&Expr::set(&translated, Expr::cell(&position) / 2.0))
        .unwrap();

    driver.start(&position, DriverConfig::spring(0.0, SpringConfig::stiff()), || {});
    for _ in 0..300 {
        driver.tick(1.0 / 60.0).unwrap();
    }

    assert_eq!(position.read(), 0.0);
    assert_eq!(translated.read(), 0.0);
    assert_eq!(driver.active_count(), 0);
}

/// OnChange inside an attached root fires its trigger only on transitions.
#[test]
fn on_change_fires_per_transition_not_per_write() {
    let graph = ExpressionGraph::new();
    let watched = ValueCell::new(0.0);
    let other = ValueCell::new(0.0);
    let fired = Arc::new(AtomicI32::new(0));

    let fired_clone = fired.clone();
    let trigger = Expr::call(&[], move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
        Ok(0.0)
    });
    let root = Expr::block([
        Expr::cell(&other),
        Expr::on_change(&watched, trigger),
    ]);
    let _handle = graph.attach(&root).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // Recomputations caused by the other dependency see no transition.
    other.write(1.0).unwrap();
    other.write(2.0).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    watched.write(5.0).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    other.write(3.0).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Detach on one of two roots sharing a dependency leaves the other live.
#[test]
fn detach_is_independent_across_shared_dependencies() {
    let graph = ExpressionGraph::new();
    let shared = ValueCell::new(0.0);
    let out_a = ValueCell::new(0.0);
    let out_b = ValueCell::new(0.0);

    let handle_a = graph
        .attach(&Expr::set(&out_a, Expr::cell(&shared) + 1.0))
        .unwrap();
    let handle_b = graph
        .attach(&Expr::set(&out_b, Expr::cell(&shared) + 2.0))
        .unwrap();

    graph.detach(&handle_a);
    graph.detach(&handle_a);

    shared.write(10.0).unwrap();
    assert_eq!(out_a.read(), 1.0);
    assert_eq!(out_b.read(), 12.0);

    graph.detach(&handle_b);
    assert_eq!(shared.listener_count(), 0);
}

/// Propagation through listeners is depth-first: a chained root's effects
/// land before the originating write returns.
#[test]
fn propagation_is_depth_first_and_synchronous() {
    let graph = ExpressionGraph::new();
    let input = ValueCell::new(0.0);
    let mid = ValueCell::new(0.0);
    let log = Arc::new(Mutex::new(Vec::new()));

    graph.attach(&Expr::set(&mid, Expr::cell(&input) * 10.0)).unwrap();

    let log_clone = log.clone();
    mid.subscribe(move |v| {
        log_clone.lock().unwrap().push(v);
        Ok(())
    });

    input.write(1.0).unwrap();
    input.write(2.0).unwrap();

    assert_eq!(*log.lock().unwrap(), vec![10.0, 20.0]);
    assert_eq!(mid.read(), 20.0);
}

/// Component teardown: destroying cells after detach leaves no listeners
/// and later samples fail loudly instead of writing stale state.
#[test]
fn teardown_after_detach_rejects_further_samples() {
    let graph = ExpressionGraph::new();
    let state = ValueCell::bridged(0.0);
    let output = ValueCell::new(0.0);

    let handle = graph
        .attach(&Expr::set(&output, Expr::cell(&state) + 1.0))
        .unwrap();
    let handler = EventBinder::bind(FieldMap::new().map("state", &state));

    graph.detach(&handle);
    state.destroy();
    output.destroy();

    assert!(handler.handle(&Sample::new().with("state", 2.0)).is_err());
}
