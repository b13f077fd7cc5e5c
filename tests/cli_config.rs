use std::env;
use std::fs;
use std::time::Duration;

use clap::Parser;
use report_merge::{CliArgs, MergeConfig, MergeError, OutputLayout, ResolveStrategy, exit_code_for};
use serial_test::serial;

#[test]
fn parses_full_command_line() {
    let args = CliArgs::try_parse_from([
        "report-merge",
        "run1",
        "run2.xml",
        "run3",
        "-o",
        "merged",
        "--resolve",
        "interactive",
        "--layout",
        "xml",
        "--force",
        "--notice-delay-ms",
        "250",
    ])
    .expect("parse");
    let config = MergeConfig::from_args(args).expect("config");

    assert_eq!(config.inputs.len(), 3);
    assert_eq!(config.layout, OutputLayout::XmlFile);
    assert_eq!(config.resolve, ResolveStrategy::Interactive);
    assert!(config.overwrite);
    assert_eq!(config.notice_delay, Duration::from_millis(250));
}

#[test]
fn strategy_aliases_are_accepted() {
    let args =
        CliArgs::try_parse_from(["report-merge", "a", "b", "-o", "out", "--resolve", "recent"])
            .expect("parse");
    assert_eq!(args.resolve, Some(ResolveStrategy::MostRecent));
}

#[test]
fn unknown_strategy_is_rejected() {
    let parsed =
        CliArgs::try_parse_from(["report-merge", "a", "b", "-o", "out", "--resolve", "random"]);
    assert!(parsed.is_err());
}

#[test]
#[serial]
fn output_falls_back_to_environment() {
    // SAFETY: env tests run serially
    unsafe {
        env::set_var("REPORT_MERGE_OUTPUT", "from-env.xml");
        env::set_var("REPORT_MERGE_RESOLVE", "fail");
    }
    let parsed = CliArgs::try_parse_from(["report-merge", "a.xml", "b.xml"]);
    unsafe {
        env::remove_var("REPORT_MERGE_OUTPUT");
        env::remove_var("REPORT_MERGE_RESOLVE");
    }

    let config = MergeConfig::from_args(parsed.expect("parse")).expect("config");
    assert_eq!(config.output.to_str(), Some("from-env.xml"));
    assert_eq!(config.layout, OutputLayout::XmlFile);
    assert_eq!(config.resolve, ResolveStrategy::Fail);
}

#[test]
#[serial]
fn command_line_beats_environment() {
    unsafe {
        env::set_var("REPORT_MERGE_OUTPUT", "from-env");
    }
    let parsed = CliArgs::try_parse_from(["report-merge", "a", "b", "--output", "from-cli"]);
    unsafe {
        env::remove_var("REPORT_MERGE_OUTPUT");
    }
    let config = MergeConfig::from_args(parsed.expect("parse")).expect("config");
    assert_eq!(config.output.to_str(), Some("from-cli"));
    assert_eq!(config.layout, OutputLayout::ReportDir);
}

#[test]
#[serial]
fn yaml_file_fills_missing_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.xml");
    let b = dir.path().join("b.xml");
    fs::write(&a, "<Report/>").unwrap();
    fs::write(&b, "<Report/>").unwrap();
    let config_path = dir.path().join("merge.yml");
    fs::write(
        &config_path,
        format!(
            "inputs:\n  - {}\n  - {}\noutput: {}\nlayout: report-dir\n",
            a.display(),
            b.display(),
            dir.path().join("out").display()
        ),
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "report-merge",
        "--config",
        config_path.to_str().unwrap(),
    ])
    .expect("parse");
    let config = MergeConfig::from_args(args).expect("config");
    config.validate().expect("valid");
    assert_eq!(config.inputs, vec![a, b]);
    assert_eq!(config.resolve, ResolveStrategy::MostRecent);
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("merge.yaml");
    fs::write(&config_path, "output: out\nstrategy: fail\n").unwrap();
    let args = CliArgs {
        config: Some(config_path),
        ..Default::default()
    };
    assert!(MergeConfig::from_args(args).is_err());
}

#[test]
fn missing_input_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let present = dir.path().join("present.xml");
    fs::write(&present, "<Report/>").unwrap();
    let args = CliArgs {
        inputs: vec![present, dir.path().join("absent.xml")],
        output: Some(dir.path().join("out")),
        ..Default::default()
    };
    let config = MergeConfig::from_args(args).expect("config");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("absent.xml"));
    assert_eq!(exit_code_for(&err), 2);
}

#[test]
fn unusable_config_files_exit_as_invalid_arguments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = dir.path().join("broken.yaml");
    fs::write(&broken, "inputs: [unterminated\n").unwrap();
    let ini = dir.path().join("merge.ini");
    fs::write(&ini, "output=x").unwrap();

    for path in [dir.path().join("absent.yaml"), broken, ini] {
        let args = CliArgs {
            config: Some(path.clone()),
            ..Default::default()
        };
        let err = MergeConfig::from_args(args).unwrap_err();
        assert_eq!(exit_code_for(&err), 2, "{path:?}: {err:#}");
    }
}

#[test]
fn exit_codes_map_error_kinds() {
    let not_enough = anyhow::Error::from(MergeError::NotEnoughInputs { count: 1 });
    assert_eq!(exit_code_for(&not_enough), 2);

    let conflict = anyhow::Error::from(MergeError::UnresolvedConflict {
        url: "api/a.html".to_string(),
        inputs: vec!["a".to_string(), "b".to_string()],
    });
    assert_eq!(exit_code_for(&conflict), 3);

    let other = anyhow::anyhow!("something else");
    assert_eq!(exit_code_for(&other), 1);
}
