use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use pacskit::engine::progress::{Progress, ProgressCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: BarState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct BarState {
    active_bar: Option<ProgressBar>,
    base_message: String,
    cycle_label: String,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: BarState::default(),
            event_receiver,
            shutdown_receiver,
            sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        // Drain whatever was queued before the shutdown signal.
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.state.active_bar.take() {
            bar.finish_and_clear();
        }
        self.sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::CycleStart { cycle, max_cycle } => {
                self.state.cycle_label = format!("[cycle {}/{}]", cycle, max_cycle);
            }
            Progress::CycleFinish { cycle } => {
                self.mp.println(format!("● cycle {} finished", cycle)).ok();
                self.state.cycle_label.clear();
            }
            Progress::PhaseStart { name } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let label = self.label(&name);
                let pb = self.mp.add(ProgressBar::new_spinner());
                pb.enable_steady_tick(Duration::from_millis(80));
                pb.set_style(Self::spinner_style());
                pb.set_message(label.clone());

                self.state.active_bar = Some(pb);
                self.state.base_message = label;
            }
            Progress::PhaseFinish => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }

                let final_message = format!("✓ {}", self.state.base_message);
                self.mp.println(final_message).ok();

                self.state.base_message.clear();
            }
            Progress::TaskStart { total_steps } => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.set_style(Self::bar_style());
                    bar.set_length(total_steps);
                    bar.set_position(0);
                    bar.disable_steady_tick();
                }
            }
            Progress::TaskIncrement => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.inc(1);
                }
            }
            Progress::TaskFinish => {
                if let Some(bar) = self.state.active_bar.as_ref() {
                    if let Some(length) = bar.length() {
                        bar.set_position(length);
                    }
                    bar.set_style(Self::spinner_style());
                    bar.enable_steady_tick(Duration::from_millis(80));
                }
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn label(&self, name: &str) -> String {
        if self.state.cycle_label.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", self.state.cycle_label, name)
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<45} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("━╸ ")
    }
}

#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn setup_manager() -> UiManager {
        let (manager, _, _) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    fn phase(manager: &mut UiManager, name: &str) {
        manager.handle_event(UiEvent::Progress(Progress::PhaseStart { name: name.into() }));
    }

    mod phases {
        use super::*;

        #[test]
        fn phase_start_creates_new_spinner() {
            let mut manager = setup_manager();
            assert!(manager.state.active_bar.is_none());

            phase(&mut manager, "segment-run fore");

            let bar = manager.state.active_bar.as_ref().unwrap();
            assert_eq!(bar.message(), "segment-run fore");
            assert_eq!(manager.state.base_message, "segment-run fore");
        }

        #[test]
        fn phase_label_carries_the_current_cycle() {
            let mut manager = setup_manager();
            manager.handle_event(UiEvent::Progress(Progress::CycleStart {
                cycle: 4,
                max_cycle: 30,
            }));

            phase(&mut manager, "analyze");

            assert_eq!(manager.state.base_message, "[cycle 4/30] analyze");

            manager.handle_event(UiEvent::Progress(Progress::CycleFinish { cycle: 4 }));
            phase(&mut manager, "analyze");
            assert_eq!(manager.state.base_message, "analyze");
        }

        #[test]
        fn phase_start_replaces_existing_bar() {
            let mut manager = setup_manager();
            phase(&mut manager, "First Phase");
            phase(&mut manager, "Second Phase");

            let second_bar = manager.state.active_bar.as_ref().unwrap();
            assert_eq!(second_bar.message(), "Second Phase");
        }

        #[test]
        fn phase_finish_clears_active_bar() {
            let mut manager = setup_manager();
            phase(&mut manager, "Test Phase");

            manager.handle_event(UiEvent::Progress(Progress::PhaseFinish));

            assert!(manager.state.active_bar.is_none());
            assert!(manager.state.base_message.is_empty());
        }
    }

    mod tasks {
        use super::*;

        #[test]
        fn task_start_configures_bar_for_task() {
            let mut manager = setup_manager();
            phase(&mut manager, "Test Phase");

            manager.handle_event(UiEvent::Progress(Progress::TaskStart { total_steps: 16 }));

            let bar = manager.state.active_bar.as_ref().unwrap();
            assert_eq!(bar.length(), Some(16));
            assert_eq!(bar.position(), 0);
        }

        #[test]
        fn task_increment_and_finish_move_the_bar() {
            let mut manager = setup_manager();
            phase(&mut manager, "Test Phase");
            manager.handle_event(UiEvent::Progress(Progress::TaskStart { total_steps: 8 }));

            manager.handle_event(UiEvent::Progress(Progress::TaskIncrement));
            manager.handle_event(UiEvent::Progress(Progress::TaskIncrement));
            assert_eq!(manager.state.active_bar.as_ref().unwrap().position(), 2);

            manager.handle_event(UiEvent::Progress(Progress::TaskFinish));
            assert_eq!(manager.state.active_bar.as_ref().unwrap().position(), 8);
        }

        #[test]
        fn task_events_without_a_phase_are_ignored() {
            let mut manager = setup_manager();
            manager.handle_event(UiEvent::Progress(Progress::TaskStart { total_steps: 3 }));
            manager.handle_event(UiEvent::Progress(Progress::TaskIncrement));
            assert!(manager.state.active_bar.is_none());
        }
    }

    #[tokio::test]
    async fn progress_handler_sends_progress_event() {
        let (sender, mut receiver) = mpsc::channel(1);
        let handler = CliProgressHandler::new(sender);
        let callback = handler.get_callback();

        callback(Progress::PhaseStart {
            name: "export".into(),
        });

        let event = receiver.recv().await.unwrap();
        let UiEvent::Progress(Progress::PhaseStart { name }) = event else {
            panic!("Incorrect event received");
        };
        assert_eq!(name, "export");
    }

    #[tokio::test]
    async fn run_loop_exits_on_shutdown() {
        let (manager, sender, shutdown) = UiManager::new();
        manager.mp.set_draw_target(ProgressDrawTarget::hidden());
        let handle = tokio::spawn(manager.run());

        sender.send(UiEvent::Log("hello".into())).await.unwrap();
        shutdown.send(true).unwrap();

        handle.await.unwrap();
    }
}
