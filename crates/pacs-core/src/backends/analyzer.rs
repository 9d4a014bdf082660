//! Collective-variable computation through external analysis tools.
//!
//! The `gromacs` and `cpptraj` recipes cover the RMSD and center-of-mass distance evaluations.
//! A `script` analyzer runs a user command template instead; the template may use these
//! placeholders:
//!
//! | placeholder | per-replica scoring | pairwise scoring |
//! |---|---|---|
//! | `{cycle}`, `{output}` | yes | yes |
//! | `{direction}`, `{replica}`, `{replica_dir}`, `{trajectory}`, `{topology}` | yes | no |
//! | `{fore_dir}`, `{back_dir}`, `{fore_trajectory}`, `{back_trajectory}` | no | yes |
//! | `{fore_topology}`, `{back_topology}` | no | yes |
//! | `{reference}` | yes | yes |
//!
//! Per-replica output is a table with one row per frame: a single column is the CV itself, two
//! columns are `time cv`, and more columns are `time cv_1 cv_2 ...` (a vector CV). Pairwise
//! output is a matrix with one row per fore frame and one column per back frame.

use super::traits::Analyzer;
use crate::core::io::xvg::Table;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::scores::ScoresInOnePair;
use crate::core::models::snapshot::{Cv, Snapshot};
use crate::core::utils::command::{ShellCommand, quote, quote_path};
use crate::engine::config::{AnalyzerTool, EvaluationType, PacsConfig};
use crate::engine::error::EngineError;
use crate::engine::ranking::{Ranker, RankingState};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    /// Column 1 of a `time value` table.
    SecondColumn,
    /// Norm of the x, y, z columns that follow the time column.
    XyzNorm,
    /// Shape decided by the column count of the table.
    Auto,
}

/// Commands and files needed to score one replica.
#[derive(Debug, Clone, PartialEq)]
struct ScorePlan {
    script_file: Option<(PathBuf, String)>,
    commands: Vec<ShellCommand>,
    output: PathBuf,
    extract: Extract,
    scratch: Vec<PathBuf>,
}

pub struct ToolAnalyzer {
    tool: AnalyzerTool,
    ranker: Ranker,
}

impl ToolAnalyzer {
    pub fn from_config(config: &PacsConfig) -> Self {
        Self {
            tool: config.analysis.tool.clone(),
            ranker: Ranker::from_config(&config.analysis),
        }
    }

    fn plan_replica(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<ScorePlan, EngineError> {
        let dir = config.layout().replica_dir(cycle, direction, replica);
        match &self.tool {
            AnalyzerTool::Gromacs => gmx_plan(config, direction, &dir),
            AnalyzerTool::Cpptraj => Ok(cpptraj_plan(config, direction, &dir)),
            AnalyzerTool::Script { template } => {
                let output = dir.join("cv.xvg");
                let inputs = config.simulation.inputs(direction);
                let script = fill(
                    template,
                    &[
                        ("cycle", cycle.to_string()),
                        ("direction", direction.to_string()),
                        ("replica", replica.to_string()),
                        ("replica_dir", quote_path(&dir)),
                        ("trajectory", quote_path(&trajectory(config, &dir))),
                        ("topology", quote_path(&inputs.topology)),
                        ("reference", reference_arg(config)),
                        ("output", quote_path(&output)),
                    ],
                );
                Ok(ScorePlan {
                    script_file: None,
                    commands: vec![ShellCommand::new(script).with_log(dir.join("analysis.log"))],
                    output,
                    extract: Extract::Auto,
                    scratch: Vec::new(),
                })
            }
        }
    }

    fn execute(plan: &ScorePlan) -> Result<Table, EngineError> {
        if let Some((path, body)) = &plan.script_file {
            std::fs::write(path, body).map_err(|e| EngineError::io(path, e))?;
        }
        for command in &plan.commands {
            command.run()?;
        }
        let table = Table::read(&plan.output)?;
        for path in &plan.scratch {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "could not remove scratch file");
            }
        }
        Ok(table)
    }
}

impl Analyzer for ToolAnalyzer {
    fn score_replica(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        replica: ReplicaId,
    ) -> Result<Vec<Cv>, EngineError> {
        let plan = self.plan_replica(config, cycle, direction, replica)?;
        let table = Self::execute(&plan)?;
        let cvs = extract(&table, plan.extract)?;
        let evaluation = self.ranker.evaluation();
        if !evaluation.ranks_vectors() && cvs.iter().any(|cv| cv.as_scalar().is_none()) {
            return Err(EngineError::Parse {
                path: plan.output,
                line: 0,
                message: format!("{} ranks one CV value per frame, found a vector", evaluation),
            });
        }
        Ok(cvs)
    }

    fn score_pair(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
    ) -> Result<ScoresInOnePair, EngineError> {
        let AnalyzerTool::Script { template } = &self.tool else {
            return Err(EngineError::Unsupported(format!(
                "pairwise scoring with the {} analyzer",
                self.tool.name()
            )));
        };
        let layout = config.layout();
        let fore_dir = layout.replica_dir(cycle, Direction::Fore, fore_replica);
        let back_dir = layout.replica_dir(cycle, Direction::Back, back_replica);
        let output = fore_dir.join(format!("pair_back{:03}.xvg", back_replica));
        let script = fill(
            template,
            &[
                ("cycle", cycle.to_string()),
                ("fore_dir", quote_path(&fore_dir)),
                ("back_dir", quote_path(&back_dir)),
                ("fore_trajectory", quote_path(&trajectory(config, &fore_dir))),
                ("back_trajectory", quote_path(&trajectory(config, &back_dir))),
                ("fore_topology", quote_path(&config.simulation.fore.topology)),
                ("back_topology", quote_path(&config.simulation.back.topology)),
                ("reference", reference_arg(config)),
                ("output", quote_path(&output)),
            ],
        );
        let log = fore_dir.join(format!("pair_back{:03}.log", back_replica));
        ShellCommand::new(script).with_log(log).run()?;

        let table = Table::read(&output)?;
        Ok(ScoresInOnePair::from_rows(
            cycle,
            fore_replica,
            back_replica,
            table.into_rows(),
        )?)
    }

    fn is_pairwise(&self) -> bool {
        self.ranker.evaluation().is_pairwise()
    }

    fn rank(&self, snapshots: Vec<Snapshot>, state: &mut RankingState) -> Vec<Snapshot> {
        self.ranker.rank(snapshots, state)
    }

    fn is_converged(&self, ranked: &[Snapshot]) -> bool {
        self.ranker.meets_threshold(ranked)
    }

    fn initial_state(&self) -> RankingState {
        RankingState::initial(self.ranker.evaluation())
    }
}

fn trajectory(config: &PacsConfig, dir: &Path) -> PathBuf {
    dir.join(format!("prd{}", config.simulation.trajectory_extension))
}

fn reference_arg(config: &PacsConfig) -> String {
    config
        .analysis
        .reference
        .as_deref()
        .map(quote_path)
        .unwrap_or_default()
}

fn selection(value: &Option<String>, name: &'static str) -> Result<String, EngineError> {
    value
        .clone()
        .ok_or_else(|| EngineError::Unsupported(format!("analysis without {}", name)))
}

fn measures_rmsd(evaluation: EvaluationType) -> bool {
    matches!(evaluation, EvaluationType::Target | EvaluationType::Rmsd)
}

fn gmx_plan(
    config: &PacsConfig,
    direction: Direction,
    dir: &Path,
) -> Result<ScorePlan, EngineError> {
    let gmx = config.simulation.gmx();
    let analysis = &config.analysis;
    let index = config
        .simulation
        .inputs(direction)
        .index_file
        .as_deref()
        .map(quote_path)
        .ok_or_else(|| EngineError::Unsupported("gmx analysis without an index file".into()))?;
    let ext = &config.simulation.trajectory_extension;
    let traj = quote_path(&trajectory(config, dir));
    let tpr = quote_path(&dir.join("prd.tpr"));
    let image_path = dir.join(format!("prd_image{}", ext));
    let image = quote_path(&image_path);
    let sel1 = selection(&analysis.selection1, "selection1")?;
    let sel2 = selection(&analysis.selection2, "selection2")?;

    let pbc = if analysis.nojump {
        "-pbc nojump"
    } else {
        "-pbc mol -ur compact"
    };
    let imaging = ShellCommand::new(format!(
        "echo System | {gmx} trjconv -f {traj} -s {tpr} -o {image} {pbc}"
    ))
    .with_log(dir.join("image.log"));

    let (measure, output, extract) = if measures_rmsd(analysis.evaluation) {
        let output = dir.join("rms.xvg");
        let command = ShellCommand::new(format!(
            "echo {sel1} {sel2} | {gmx} rms -f {image} -s {reference} -o {out} -n {index} -pbc no -nomw -xvg none",
            reference = reference_arg(config),
            out = quote_path(&output),
        ))
        .with_log(dir.join("rms.log"));
        (command, output, Extract::SecondColumn)
    } else {
        let output = dir.join("interCOM_xyz.xvg");
        let command = ShellCommand::new(format!(
            "{gmx} distance -f {image} -s {tpr} -n {index} -oxyz {out} -xvg none -select {select}",
            out = quote_path(&output),
            select = quote(format!("com of group {} plus com of group {}", sel1, sel2)),
        ))
        .with_log(dir.join("distance.log"));
        (command, output, Extract::XyzNorm)
    };

    Ok(ScorePlan {
        script_file: None,
        commands: vec![imaging, measure],
        output,
        extract,
        scratch: vec![image_path],
    })
}

fn cpptraj_plan(config: &PacsConfig, direction: Direction, dir: &Path) -> ScorePlan {
    let analysis = &config.analysis;
    let topology = config.simulation.inputs(direction).topology.display().to_string();
    let sel1 = analysis.selection1.as_deref().unwrap_or_default();
    let sel2 = analysis.selection2.as_deref().unwrap_or_default();

    let mut lines = vec![
        format!("parm {}", topology),
        format!("trajin {}", trajectory(config, dir).display()),
        format!("center {}", config.export.centering_selection),
        "image".to_string(),
    ];
    let (output, log) = if measures_rmsd(analysis.evaluation) {
        let output = dir.join("rms.xvg");
        let reference = analysis
            .reference
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        lines.push(format!("reference {} [refstr]", reference));
        lines.push(format!("rms fit ref [refstr] {}", sel1));
        lines.push(format!(
            "rms cal ref [refstr] {} nofit out {}",
            sel2,
            output.display()
        ));
        (output, dir.join("rms.log"))
    } else {
        let output = dir.join("interCOM.xvg");
        lines.push(format!("distance {} {} out {}", sel1, sel2, output.display()));
        (output, dir.join("distance.log"))
    };
    lines.push("run".to_string());
    lines.push("quit".to_string());

    let script_path = dir.join("calCV.cpptraj");
    let command =
        ShellCommand::new(format!("cpptraj -i {}", quote_path(&script_path))).with_log(log);
    ScorePlan {
        script_file: Some((script_path, lines.join("\n") + "\n")),
        commands: vec![command],
        output,
        extract: Extract::SecondColumn,
        scratch: Vec::new(),
    }
}

fn extract(table: &Table, how: Extract) -> Result<Vec<Cv>, EngineError> {
    let values = match how {
        Extract::SecondColumn => table.column(1)?.into_iter().map(Cv::Scalar).collect(),
        Extract::XyzNorm => table.row_norms(1, 3)?.into_iter().map(Cv::Scalar).collect(),
        Extract::Auto => table
            .rows()
            .iter()
            .map(|row| match row.len() {
                1 => Cv::Scalar(row[0]),
                2 => Cv::Scalar(row[1]),
                _ => Cv::Vector(row[1..].to_vec()),
            })
            .collect(),
    };
    Ok(values)
}

/// Substitutes `{key}` placeholders in a command template.
pub(crate) fn fill(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
