use super::*;
use std::sync::Mutex;

#[test]
fn listener_hears_only_effective_changes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = DirtyState::new();
    let sink = Arc::clone(&seen);
    state.set_listener(DirtyListener::new(move |dirty| {
        sink.lock().expect("lock").push(dirty);
    }));

    state.set_dirty(false);
    state.set_dirty(true);
    state.set_dirty(true);
    state.set_dirty(false);

    assert_eq!(*seen.lock().expect("lock"), vec![true, false]);
    assert!(!state.is_dirty());
}

#[test]
fn changes_before_a_listener_is_installed_are_kept() {
    let state = DirtyState::new();
    state.set_dirty(true);
    assert!(state.is_dirty());
}
