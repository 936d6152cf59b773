//! Tests for the `Action` derive macro.

use tirtha_macros::Action;

#[derive(Action, Clone, Debug)]
enum SampleAction {
    #[command]
    Submit { note: String },

    #[event]
    Submitted { id: u32 },

    #[event]
    Rejected(String),

    // Neither command nor event
    Tick,
}

#[test]
fn commands_and_events_are_classified() {
    let submit = SampleAction::Submit { note: "hi".into() };
    assert!(submit.is_command());
    assert!(!submit.is_event());

    let submitted = SampleAction::Submitted { id: 1 };
    assert!(submitted.is_event());
    assert!(!submitted.is_command());

    let rejected = SampleAction::Rejected("no".into());
    assert!(rejected.is_event());
}

#[test]
fn unmarked_variants_are_neither() {
    assert!(!SampleAction::Tick.is_command());
    assert!(!SampleAction::Tick.is_event());
}

#[test]
fn labels_are_variant_names() {
    assert_eq!(SampleAction::Tick.label(), "Tick");
    assert_eq!(SampleAction::Submitted { id: 1 }.label(), "Submitted");
}
