use super::Endpoints;
use crate::backends::traits::Exporter;
use crate::core::io::xvg::Table;
use crate::core::models::ids::{CycleIndex, Direction, ReplicaId};
use crate::core::models::snapshot::Snapshot;
use crate::core::utils::command::{ShellCommand, quote_path};
use crate::engine::config::PacsConfig;
use crate::engine::error::EngineError;
use std::path::Path;
use tracing::{debug, info};

/// Frame index to simulation time (ps) mapping shared by every replica of a trial.
///
/// `trjconv` selects frames by time, so the mapping is measured once on the first cycle-0
/// trajectory and stored as `frame_time.tsv` next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimes {
    times: Vec<f64>,
}

impl FrameTimes {
    /// Builds the mapping from a `time value` table, one row per frame.
    pub fn from_table(table: &Table) -> Result<Self, EngineError> {
        Ok(Self {
            times: table.column(0)?,
        })
    }

    /// Reads a `frame_time.tsv` file; rows are stored in frame order.
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            times: Table::read(path)?.column(1)?,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        let mut text = String::from("# frame\ttime(ps)\n");
        for (frame, time) in self.times.iter().enumerate() {
            text.push_str(&format!("{}\t{:.3}\n", frame, time));
        }
        std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
    }

    pub fn time_of(&self, frame: usize) -> Option<f64> {
        self.times.get(frame).copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

pub struct GromacsExporter;

impl GromacsExporter {
    fn measure_frame_times(config: &PacsConfig) -> Result<FrameTimes, EngineError> {
        let dir = config.layout().replica_dir(0, Direction::Fore, 1);
        let output = dir.join("pseudo_rms.xvg");
        ShellCommand::new(format!(
            "echo 0 0 | {gmx} rms -f {traj} -s {gro} -o {out} -nomw -xvg none",
            gmx = config.simulation.gmx(),
            traj = quote_path(&dir.join(format!("prd{}", config.simulation.trajectory_extension))),
            gro = quote_path(&dir.join("prd.gro")),
            out = quote_path(&output),
        ))
        .with_log(dir.join("pseudo_rms.log"))
        .run()?;
        FrameTimes::from_table(&Table::read(&output)?)
    }

    fn commands(
        config: &PacsConfig,
        ends: &Endpoints,
        time: f64,
    ) -> Result<Vec<ShellCommand>, EngineError> {
        let simulation = &config.simulation;
        let export = &config.export;
        let gmx = simulation.gmx();
        let index = simulation
            .fore
            .index_file
            .as_deref()
            .ok_or_else(|| {
                EngineError::Unsupported("gromacs export without an index file".into())
            })?;
        let tpr = quote_path(&ends.source_dir.join("prd.tpr"));
        let imaged = ends
            .target_dir
            .join(format!("prd_image_prev_cycle{}", simulation.trajectory_extension));
        let log = ends.target_dir.join("export.log");

        let pbc = if config.analysis.nojump {
            "-pbc nojump"
        } else {
            "-pbc whole"
        };
        let (groups, center) = if export.centering {
            (format!("{} System", export.centering_selection), " -center")
        } else {
            ("System".to_string(), "")
        };
        let image = format!(
            "echo {groups} | {gmx} trjconv -f {traj} -o {out} -s {tpr} -n {ndx} {pbc}{center}",
            traj = quote_path(&ends.trajectory),
            out = quote_path(&imaged),
            ndx = quote_path(index),
        );
        let extract = format!(
            "echo System | {gmx} trjconv -f {src} -o {out} -s {tpr} -b {t:.3} -e {t:.3} -novel",
            src = quote_path(&imaged),
            out = quote_path(&ends.output),
            t = time,
        );
        Ok(vec![
            ShellCommand::new(image).with_log(&log),
            ShellCommand::new(extract).with_log(&log),
            ShellCommand::new(format!("rm -f {}", quote_path(&imaged))),
        ])
    }
}

impl Exporter for GromacsExporter {
    fn prepare(&self, config: &PacsConfig, _cycle: CycleIndex) -> Result<(), EngineError> {
        let path = config.layout().frame_time_file();
        if path.exists() {
            return Ok(());
        }
        let times = Self::measure_frame_times(config)?;
        info!(frames = times.len(), path = %path.display(), "recorded frame times");
        times.write(&path)
    }

    fn export_snapshot(
        &self,
        config: &PacsConfig,
        cycle: CycleIndex,
        direction: Direction,
        snapshot: &Snapshot,
        target: ReplicaId,
    ) -> Result<(), EngineError> {
        let path = config.layout().frame_time_file();
        let times = FrameTimes::read(&path)?;
        let time = times.time_of(snapshot.frame).ok_or_else(|| EngineError::Parse {
            path: path.clone(),
            line: 0,
            message: format!(
                "no time recorded for frame {} ({} frame(s) known)",
                snapshot.frame,
                times.len()
            ),
        })?;

        let ends = Endpoints::resolve(config, cycle, direction, snapshot, target);
        debug!(%snapshot, time, target, "exporting with trjconv");
        for command in Self::commands(config, &ends, time)? {
            command.run()?;
        }
        Ok(())
    }
}
