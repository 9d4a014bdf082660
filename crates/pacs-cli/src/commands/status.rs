use crate::error::Result;
use pacskit::engine::config::PacsConfig;
use pacskit::workflows::trial::{self, CycleStatus, DirectionStatus};

pub async fn run(config: PacsConfig) -> Result<()> {
    let cycles = trial::status(&config)?;
    if cycles.is_empty() {
        println!(
            "Trial {} has not started ({} does not exist yet).",
            config.trial,
            config.layout().trial_dir().display()
        );
        return Ok(());
    }

    println!("Trial {} (max cycle {})", config.trial, config.max_cycle);
    for status in &cycles {
        println!("{}", render(status));
    }
    Ok(())
}

fn render(status: &CycleStatus) -> String {
    let marker = if status.is_complete() { "✓" } else { "…" };
    format!(
        "{} cycle {:03}  fore {}  back {}",
        marker,
        status.cycle,
        render_direction(&status.directions.fore),
        render_direction(&status.directions.back)
    )
}

fn render_direction(status: &DirectionStatus) -> String {
    let export = if status.exported { "exported" } else { "pending" };
    format!("{}/{} ({})", status.finished, status.total, export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacskit::core::models::ids::PerDirection;

    #[test]
    fn cycle_lines_show_both_directions() {
        let status = CycleStatus {
            cycle: 7,
            directions: PerDirection::new(
                DirectionStatus {
                    finished: 8,
                    total: 8,
                    exported: true,
                },
                DirectionStatus {
                    finished: 3,
                    total: 8,
                    exported: false,
                },
            ),
        };

        assert_eq!(
            render(&status),
            "… cycle 007  fore 8/8 (exported)  back 3/8 (pending)"
        );
    }
}
