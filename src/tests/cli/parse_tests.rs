//! Tests for the clap command-line surface.

use std::path::PathBuf;

use clap::ValueEnum;
use clap::error::ErrorKind;

use crate::cli::try_parse_from;
use crate::config::{BackendKind, Mode};
use crate::tests::support::stage_args;

#[test]
fn defaults_without_arguments() {
    let args = stage_args(&[]);
    assert_eq!(args.mode, Mode::File);
    assert_eq!(args.source, None);
    assert_eq!(args.dest, None);
    assert!(!args.hdfs);
    assert!(!args.skip);
    assert_eq!(args.log_level, "info");
    assert!(args.files.is_empty());
}

#[test]
fn short_flags_and_positional_files() {
    let args = stage_args(&[
        "-m", "s", "-s", "h", "-d", "f", "-i", "in", "-o", "/out", "-e", "<EOM>", "-E", "-", "-c",
        "stage.toml", "a.json", "b.json",
    ]);
    assert_eq!(args.mode, Mode::Stream);
    assert_eq!(args.source, Some(BackendKind::Distributed));
    assert_eq!(args.dest, Some(BackendKind::File));
    assert_eq!(args.input_dir, Some(PathBuf::from("in")));
    assert_eq!(args.output_dir, Some(PathBuf::from("/out")));
    assert_eq!(args.eom.as_deref(), Some("<EOM>"));
    assert_eq!(args.eop.as_deref(), Some("-"));
    assert_eq!(args.config, Some(PathBuf::from("stage.toml")));
    assert_eq!(args.files, [PathBuf::from("a.json"), PathBuf::from("b.json")]);
}

#[test]
fn long_flags_accept_descriptive_aliases() {
    let args = stage_args(&[
        "--mode",
        "map-reduce",
        "--source",
        "hdfs",
        "--dest",
        "stream",
        "--end-of-message",
        "",
        "--hdfs",
        "--skip",
        "--log-level",
        "debug",
    ]);
    assert_eq!(args.mode, Mode::Batch);
    assert_eq!(args.source, Some(BackendKind::Distributed));
    assert_eq!(args.dest, Some(BackendKind::Stream));
    assert_eq!(args.eom.as_deref(), Some(""));
    assert!(args.hdfs);
    assert!(args.skip);
    assert_eq!(args.log_level, "debug");
}

#[test]
fn unknown_mode_is_rejected() {
    let err = try_parse_from("stage", ["stage", "-m", "x"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn help_is_reported_as_an_error_kind() {
    let err = try_parse_from("stage", ["stage", "--help"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    assert!(err.to_string().contains("end-of-message"));
}

#[test]
fn kinds_parse_from_strings() {
    assert_eq!("stream".parse::<Mode>().unwrap(), Mode::Stream);
    assert_eq!("M".parse::<Mode>().unwrap(), Mode::Batch);
    assert_eq!("hdfs".parse::<BackendKind>().unwrap(), BackendKind::Distributed);
    let err = "x".parse::<BackendKind>().unwrap_err();
    assert!(err.to_string().contains("expected one of: f, s, h"));
    assert_eq!(Mode::Batch.to_string(), "map-reduce");
}

#[test]
fn mode_help_describes_map_reduce_defaults() {
    let value = Mode::Batch.to_possible_value().unwrap();
    assert_eq!(value.get_name(), "m");
    let help = value.get_help().unwrap().to_string();
    assert!(help.contains("stdin/stdout"), "{help}");
    assert!(help.contains("no end-of-process marker by default"), "{help}");
}
