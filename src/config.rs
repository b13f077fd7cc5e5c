use crate::error::MergeError;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_NOTICE_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    /// Keep the result that finished last
    #[value(alias = "recent")]
    #[serde(alias = "recent")]
    MostRecent,
    /// Ask on the terminal for each conflict
    Interactive,
    /// Stop at the first conflict
    Fail,
}

impl std::fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveStrategy::MostRecent => write!(f, "most-recent"),
            ResolveStrategy::Interactive => write!(f, "interactive"),
            ResolveStrategy::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// Report directory with xml/, text/ and html/ pages
    #[value(alias = "dir")]
    #[serde(alias = "dir")]
    ReportDir,
    /// A single merged XML file
    #[value(alias = "xml")]
    #[serde(alias = "xml")]
    XmlFile,
}

impl OutputLayout {
    /// Layout implied by the output path: `*.xml` is a file, anything else a directory.
    pub fn infer(output: &Path) -> Self {
        let is_xml = output
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xml"))
            .unwrap_or(false);
        if is_xml {
            OutputLayout::XmlFile
        } else {
            OutputLayout::ReportDir
        }
    }
}

impl std::fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputLayout::ReportDir => write!(f, "report-dir"),
            OutputLayout::XmlFile => write!(f, "xml-file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub layout: OutputLayout,
    pub resolve: ResolveStrategy,
    pub overwrite: bool,
    pub notice_delay: Duration,
}

impl MergeConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            inputs: cli_inputs,
            output: cli_output,
            layout: cli_layout,
            resolve: cli_resolve,
            force: cli_force,
            notice_delay_ms: cli_notice_delay_ms,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            inputs: file_inputs,
            output: file_output,
            layout: file_layout,
            resolve: file_resolve,
            force: file_force,
            notice_delay_ms: file_notice_delay_ms,
        } = file_config;

        let inputs = if cli_inputs.is_empty() {
            file_inputs.unwrap_or_default()
        } else {
            cli_inputs
        };

        let output = cli_output
            .or(file_output)
            .ok_or_else(|| MergeError::invalid_config("no output given (use --output)"))?;

        let layout = cli_layout
            .or(file_layout)
            .unwrap_or_else(|| OutputLayout::infer(&output));

        let resolve = cli_resolve
            .or(file_resolve)
            .unwrap_or(ResolveStrategy::MostRecent);

        let overwrite = cli_force || file_force.unwrap_or(false);

        let notice_delay = Duration::from_millis(
            cli_notice_delay_ms
                .or(file_notice_delay_ms)
                .unwrap_or(DEFAULT_NOTICE_DELAY_MS),
        );

        Ok(Self {
            inputs,
            output,
            layout,
            resolve,
            overwrite,
            notice_delay,
        })
    }

    /// Check the configuration before any report is opened.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.len() < 2 {
            return Err(MergeError::NotEnoughInputs {
                count: self.inputs.len(),
            }
            .into());
        }
        for input in &self.inputs {
            if !input.exists() {
                return Err(
                    MergeError::invalid_config(format!("input {:?} does not exist", input)).into(),
                );
            }
        }
        let output = normalize(&self.output);
        for input in &self.inputs {
            if normalize(input) == output {
                return Err(MergeError::invalid_config(format!(
                    "output {:?} is also an input",
                    self.output
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "report-merge",
    about = "Merge XML test-run reports into one report",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        value_name = "INPUT",
        help = "XML reports or report directories to merge"
    )]
    pub inputs: Vec<PathBuf>,

    #[arg(
        short,
        long,
        env = "REPORT_MERGE_OUTPUT",
        value_name = "PATH",
        help = "Report directory (or .xml file) to write"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        env = "REPORT_MERGE_LAYOUT",
        value_enum,
        value_name = "LAYOUT",
        help = "Output layout (report-dir or xml-file); inferred from the output path"
    )]
    pub layout: Option<OutputLayout>,

    #[arg(
        long,
        env = "REPORT_MERGE_RESOLVE",
        value_enum,
        value_name = "STRATEGY",
        help = "How to settle a test found in several inputs"
    )]
    pub resolve: Option<ResolveStrategy>,

    #[arg(long, help = "Overwrite an existing report")]
    pub force: bool,

    #[arg(
        long,
        env = "REPORT_MERGE_NOTICE_DELAY_MS",
        value_name = "MS",
        help = "Announce a long merge after this many milliseconds",
        value_parser = clap::value_parser!(u64)
    )]
    pub notice_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    inputs: Option<Vec<PathBuf>>,
    output: Option<PathBuf>,
    layout: Option<OutputLayout>,
    resolve: Option<ResolveStrategy>,
    force: Option<bool>,
    notice_delay_ms: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        return Err(
            MergeError::invalid_config(format!("config file {:?} does not exist", path)).into(),
        );
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| MergeError::invalid_config(format!("failed to read {:?}: {}", path, e)))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
            MergeError::invalid_config(format!("failed to parse YAML config {:?}: {}", path, e))
        })?,
        "json" => serde_json::from_str(&contents).map_err(|e| {
            MergeError::invalid_config(format!("failed to parse JSON config {:?}: {}", path, e))
        })?,
        other => {
            return Err(MergeError::invalid_config(format!(
                "unsupported config extension: {other:?}"
            ))
            .into());
        }
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(inputs: &[&str], output: Option<&str>) -> CliArgs {
        CliArgs {
            inputs: inputs.iter().map(PathBuf::from).collect(),
            output: output.map(PathBuf::from),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let config = MergeConfig::from_args(args(&["a.xml", "b.xml"], Some("merged"))).unwrap();
        assert_eq!(config.layout, OutputLayout::ReportDir);
        assert_eq!(config.resolve, ResolveStrategy::MostRecent);
        assert!(!config.overwrite);
        assert_eq!(config.notice_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn xml_output_infers_file_layout() {
        let config =
            MergeConfig::from_args(args(&["a.xml", "b.xml"], Some("merged.XML"))).unwrap();
        assert_eq!(config.layout, OutputLayout::XmlFile);
    }

    #[test]
    fn missing_output_is_rejected() {
        let err = MergeConfig::from_args(args(&["a.xml", "b.xml"], None)).unwrap_err();
        assert!(err.to_string().contains("no output given"));
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge.yaml");
        fs::write(
            &path,
            "inputs: [one.xml, two.xml]\noutput: from-file\nresolve: fail\nnotice_delay_ms: 50\n",
        )
        .unwrap();

        let mut cli = args(&[], None);
        cli.config = Some(path.clone());
        let config = MergeConfig::from_args(cli).unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("one.xml"), PathBuf::from("two.xml")]);
        assert_eq!(config.output, PathBuf::from("from-file"));
        assert_eq!(config.resolve, ResolveStrategy::Fail);
        assert_eq!(config.notice_delay, Duration::from_millis(50));

        let mut cli = args(&["x.xml", "y.xml"], Some("from-cli.xml"));
        cli.config = Some(path);
        cli.resolve = Some(ResolveStrategy::Interactive);
        let config = MergeConfig::from_args(cli).unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("x.xml"), PathBuf::from("y.xml")]);
        assert_eq!(config.output, PathBuf::from("from-cli.xml"));
        assert_eq!(config.layout, OutputLayout::XmlFile);
        assert_eq!(config.resolve, ResolveStrategy::Interactive);
    }

    #[test]
    fn json_config_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge.json");
        fs::write(&path, r#"{"output": "out", "layout": "xml-file", "force": true}"#).unwrap();

        let mut cli = args(&["a.xml", "b.xml"], None);
        cli.config = Some(path);
        let config = MergeConfig::from_args(cli).unwrap();
        assert_eq!(config.layout, OutputLayout::XmlFile);
        assert!(config.overwrite);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge.ini");
        fs::write(&path, "output=x").unwrap();
        let mut cli = args(&["a.xml", "b.xml"], None);
        cli.config = Some(path);
        assert!(MergeConfig::from_args(cli).is_err());
    }

    #[test]
    fn validate_rejects_output_among_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        fs::write(&a, "<Report/>").unwrap();
        fs::write(&b, "<Report/>").unwrap();

        let config = MergeConfig {
            inputs: vec![a.clone(), b],
            output: a,
            layout: OutputLayout::XmlFile,
            resolve: ResolveStrategy::MostRecent,
            overwrite: true,
            notice_delay: Duration::from_millis(10),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("is also an input"));
    }

    #[test]
    fn validate_requires_two_inputs() {
        let config = MergeConfig {
            inputs: vec![PathBuf::from("only.xml")],
            output: PathBuf::from("out"),
            layout: OutputLayout::ReportDir,
            resolve: ResolveStrategy::MostRecent,
            overwrite: false,
            notice_delay: Duration::from_millis(10),
        };
        assert!(config.validate().is_err());
    }
}
