use crate::error::{CliError, Result};
use pacskit::engine::config::{EvaluationType, SimulatorKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

/// Tool names accepted by `analysis.analyzer` and `export.tool`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileTool {
    Gromacs,
    Cpptraj,
    Script,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDirectionInputs {
    pub structure: PathBuf,
    pub topology: PathBuf,
    pub mdconf: PathBuf,
    pub index_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSimulationConfig {
    pub simulator: Option<SimulatorKind>,
    pub trajectory_extension: Option<String>,
    pub cmd_mpi: Option<String>,
    pub cmd_serial: Option<String>,
    pub cmd_parallel: Option<String>,
    pub cmd_gmx: Option<String>,
    pub fore: Option<FileDirectionInputs>,
    pub back: Option<FileDirectionInputs>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAdaptiveConfig {
    pub reverse_bound: f64,
    pub frame_window: usize,
    pub bound_patience: u32,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAnalysisConfig {
    pub analyzer: Option<FileTool>,
    pub script: Option<String>,
    #[serde(rename = "type")]
    pub evaluation: Option<EvaluationType>,
    pub threshold: Option<f64>,
    pub skip_frame: Option<usize>,
    pub reference: Option<PathBuf>,
    pub selection1: Option<String>,
    pub selection2: Option<String>,
    pub selection3: Option<String>,
    pub selection4: Option<String>,
    pub nojump: Option<bool>,
    pub adaptive: Option<FileAdaptiveConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileExportConfig {
    pub tool: Option<FileTool>,
    pub script: Option<String>,
    pub centering: Option<bool>,
    pub centering_selection: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileCleanupConfig {
    pub remove_intermediates: Option<bool>,
    pub reduce_command: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileLaunchConfig {
    pub max_attempts: Option<u32>,
    pub liveness_timeout_secs: Option<f64>,
    pub cooldown_secs: Option<f64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub max_cycle: Option<u32>,
    pub n_replica: Option<u32>,
    pub n_parallel: Option<usize>,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub simulation: FileSimulationConfig,
    #[serde(default)]
    pub analysis: FileAnalysisConfig,
    #[serde(default)]
    pub export: FileExportConfig,
    #[serde(default)]
    pub cleanup: FileCleanupConfig,
    #[serde(default)]
    pub launch: FileLaunchConfig,
}

impl FileConfig {
    /// Reads `path` as a raw TOML table so `--set` overrides can be applied before the
    /// structure is checked.
    pub fn read_table(path: &Path) -> Result<Table> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_table(table: Table, path: &Path) -> Result<Self> {
        Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::FileParsing {
                path: path.to_path_buf(),
                source: e.into(),
            })
    }
}

/// Sets a dotted `KEY=VALUE` pair on `table`, creating intermediate tables as needed.
///
/// The value is read as a TOML literal when it parses as one (`5`, `0.2`, `true`,
/// `"quoted"`), and as a bare string otherwise.
pub fn apply_set_value(table: &mut Table, kv_pair: &str) -> Result<()> {
    let Some((key, raw)) = kv_pair.split_once('=') else {
        return Err(CliError::InvalidOverride(
            kv_pair.to_string(),
            "expected KEY=VALUE".to_string(),
        ));
    };
    let path: Vec<&str> = key.trim().split('.').map(str::trim).collect();
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(CliError::InvalidOverride(
            kv_pair.to_string(),
            "empty key segment".to_string(),
        ));
    }
    let value = parse_literal(raw.trim());

    let (leaf, parents) = path
        .split_last()
        .ok_or_else(|| CliError::InvalidOverride(kv_pair.to_string(), "empty key".to_string()))?;
    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        current = match entry {
            Value::Table(inner) => inner,
            _ => {
                return Err(CliError::InvalidOverride(
                    kv_pair.to_string(),
                    format!("'{}' is not a section", segment),
                ));
            }
        };
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

fn parse_literal(raw: &str) -> Value {
    toml::from_str::<Table>(&format!("v = {}", raw))
        .ok()
        .and_then(|mut parsed| parsed.remove("v"))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(content: &str) -> Table {
        toml::from_str(content).unwrap()
    }

    mod overrides {
        use super::*;

        #[test]
        fn literals_keep_their_toml_type() {
            let mut t = Table::new();
            apply_set_value(&mut t, "max-cycle=50").unwrap();
            apply_set_value(&mut t, "analysis.threshold = 0.25").unwrap();
            apply_set_value(&mut t, "analysis.nojump=true").unwrap();

            assert_eq!(t["max-cycle"], Value::Integer(50));
            assert_eq!(t["analysis"]["threshold"], Value::Float(0.25));
            assert_eq!(t["analysis"]["nojump"], Value::Boolean(true));
        }

        #[test]
        fn unparsable_values_become_strings() {
            let mut t = table("[simulation]\nsimulator = \"gromacs\"\n");
            apply_set_value(&mut t, "simulation.cmd-serial=gmx mdrun -ntomp 8").unwrap();
            apply_set_value(&mut t, "analysis.selection1=\"C-alpha\"").unwrap();

            assert_eq!(
                t["simulation"]["cmd-serial"],
                Value::String("gmx mdrun -ntomp 8".into())
            );
            assert_eq!(t["simulation"]["simulator"], Value::String("gromacs".into()));
            assert_eq!(t["analysis"]["selection1"], Value::String("C-alpha".into()));
        }

        #[test]
        fn malformed_pairs_are_rejected() {
            let mut t = table("trial-note = 1\n");
            assert!(matches!(
                apply_set_value(&mut t, "max-cycle"),
                Err(CliError::InvalidOverride(..))
            ));
            assert!(matches!(
                apply_set_value(&mut t, "analysis..threshold=1"),
                Err(CliError::InvalidOverride(..))
            ));
            assert!(matches!(
                apply_set_value(&mut t, "trial-note.inner=1"),
                Err(CliError::InvalidOverride(..))
            ));
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn sections_map_onto_file_config() {
            let t = table(
                r#"
                max-cycle = 30
                n-replica = 8

                [simulation]
                simulator = "amber"
                trajectory-extension = ".nc"

                [simulation.fore]
                structure = "reactant.rst7"
                topology = "complex.parm7"
                mdconf = "md.in"

                [analysis]
                analyzer = "cpptraj"
                type = "association-dissociation"

                [analysis.adaptive]
                reverse-bound = 2.5
                frame-window = 10
                bound-patience = 3

                [launch]
                poll-interval-ms = 100
                "#,
            );

            let config = FileConfig::from_table(t, Path::new("input.toml")).unwrap();

            assert_eq!(config.max_cycle, Some(30));
            assert_eq!(config.simulation.simulator, Some(SimulatorKind::Amber));
            assert_eq!(
                config.simulation.fore.unwrap().topology,
                PathBuf::from("complex.parm7")
            );
            assert!(config.simulation.back.is_none());
            assert_eq!(config.analysis.analyzer, Some(FileTool::Cpptraj));
            assert_eq!(
                config.analysis.evaluation,
                Some(EvaluationType::AssociationDissociation)
            );
            assert_eq!(config.analysis.adaptive.unwrap().bound_patience, 3);
            assert_eq!(config.launch.poll_interval_ms, Some(100));
        }

        #[test]
        fn unknown_keys_are_rejected() {
            let t = table("[analysis]\nthreshhold = 1.0\n");
            let err = FileConfig::from_table(t, Path::new("input.toml")).unwrap_err();
            assert!(matches!(err, CliError::FileParsing { .. }));
        }

        #[test]
        fn missing_file_is_an_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = FileConfig::read_table(&dir.path().join("absent.toml")).unwrap_err();
            assert!(matches!(err, CliError::Io { .. }));
        }
    }
}
