use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::reconcile::{ResultPanel, ResultRow};
use crate::session::PanelView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Operator-facing status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    RequestingCamera,
    Detecting,
    CameraError,
    Paused,
    Stopped,
}

impl Status {
    pub fn text(&self) -> &'static str {
        match self {
            Status::RequestingCamera => "Requesting camera access...",
            Status::Detecting => "Detecting...",
            Status::CameraError => "Camera error",
            Status::Paused => "Paused",
            Status::Stopped => "Stopped",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    pub fn is_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.is_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Statistics panel display, including the status line.
    pub fn panel(&self) -> PanelDisplay {
        if self.is_pretty() {
            let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
            let status = multi.add(ProgressBar::new_spinner());
            status.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            status.enable_steady_tick(Duration::from_millis(120));
            PanelDisplay {
                pretty: Some(PrettyPanel {
                    multi,
                    status,
                    rows: Mutex::new(Vec::new()),
                }),
            }
        } else {
            PanelDisplay { pretty: None }
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

struct PrettyPanel {
    multi: MultiProgress,
    status: ProgressBar,
    rows: Mutex<Vec<ProgressBar>>,
}

/// Per-class bars in pretty mode, one summary line per update otherwise.
pub struct PanelDisplay {
    pretty: Option<PrettyPanel>,
}

impl PanelDisplay {
    pub fn set_status(&self, status: Status) {
        log::info!("status: {}", status.text());
        match &self.pretty {
            Some(p) => {
                p.status.set_message(status.text());
                if status == Status::Stopped {
                    p.status.finish_with_message(status.text());
                }
            }
            None => eprintln!("--> {}", status.text()),
        }
    }

    fn update_pretty(p: &PrettyPanel, panel: &ResultPanel) {
        let Ok(mut bars) = p.rows.lock() else {
            return;
        };
        if bars.len() != panel.len() {
            for bar in bars.drain(..) {
                p.multi.remove(&bar);
            }
            for row in panel.rows() {
                let bar = p.multi.add(ProgressBar::new(100));
                bar.set_prefix(row.class().to_string());
                bars.push(bar);
            }
        }
        for (bar, row) in bars.iter().zip(panel.rows()) {
            bar.set_style(row_style(row));
            bar.set_position(u64::from(row.percent()));
            bar.set_message(row.percent_label());
        }
    }
}

impl PanelView for PanelDisplay {
    fn update(&self, panel: &ResultPanel) {
        match &self.pretty {
            Some(p) => Self::update_pretty(p, panel),
            None => eprintln!("{}", summary_line(panel)),
        }
    }
}

fn row_style(row: &ResultRow) -> ProgressStyle {
    let template = if row.is_detected() {
        "{prefix:>18.bold} [{bar:30.green}] {msg:>4}"
    } else {
        "{prefix:>18.dim} [{bar:30.dim}] {msg:>4.dim}"
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// `RBC 86% | WBC - | ...`: undetected rows show a dash.
fn summary_line(panel: &ResultPanel) -> String {
    if panel.is_empty() {
        return "(no classes)".to_string();
    }
    panel
        .rows()
        .iter()
        .map(|row| {
            if row.is_detected() {
                format!("{} {}", row.class(), row.percent_label())
            } else {
                format!("{} -", row.class())
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
