use sarge::ArgumentType;

use crate::config::{BackendKind, Mode};

#[test]
fn mode_parses_short_and_long_names() {
    let mode = <Mode as ArgumentType>::from_value(Some("s"))
        .expect("some")
        .expect("ok");
    assert_eq!(mode, Mode::Stream);

    let mode = <Mode as ArgumentType>::from_value(Some(" map-reduce "))
        .expect("some")
        .expect("ok");
    assert_eq!(mode, Mode::Batch);
}

#[test]
fn bare_mode_flag_keeps_file_mode() {
    let mode = <Mode as ArgumentType>::from_value(None)
        .expect("some")
        .expect("ok");
    assert_eq!(mode, Mode::File);
    assert_eq!(<Mode as ArgumentType>::default_value(), Some(Mode::File));
}

#[test]
fn backend_requires_a_value() {
    assert!(<BackendKind as ArgumentType>::from_value(None).is_none());
    let backend = <BackendKind as ArgumentType>::from_value(Some("h"))
        .expect("some")
        .expect("ok");
    assert_eq!(backend, BackendKind::Distributed);
    assert!(
        <BackendKind as ArgumentType>::from_value(Some("x"))
            .expect("some")
            .is_err()
    );
}
