use std::io::{self, Write};
use std::sync::Mutex;
use waffle_core::ReviewSummary;

pub const STEP_IAC_ANALYSIS: &str = "iac_analysis";
pub const STEP_QUESTIONS: &str = "question_retrieval";
pub const STEP_EVALUATION: &str = "question_evaluation";
pub const STEP_ANSWERS: &str = "answer_submission";
pub const STEP_IMPROVEMENT_PLAN: &str = "improvement_plan";
pub const STEP_MILESTONE: &str = "milestone_creation";

/// Observer for a running review. Implementations must not fail; output
/// problems are theirs to swallow.
pub trait ProgressReporter: Send + Sync {
    fn report_step(&self, step: &str, message: &str);
    fn report_progress(&self, current: usize, total: usize, message: &str);
    fn report_completion(&self, summary: &ReviewSummary);
}

/// `iac_analysis` -> `Iac Analysis`.
pub fn title_case(step: &str) -> String {
    step.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

const BAR_WIDTH: usize = 30;

pub fn render_bar(current: usize, total: usize) -> String {
    let ratio = if total == 0 { 1.0 } else { (current.min(total) as f64) / total as f64 };
    let filled = (ratio * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled),
        ratio * 100.0
    )
}

/// Human-oriented reporter writing to a terminal stream (stderr by default).
pub struct TerminalReporter<W: Write + Send = io::Stderr> {
    out: Mutex<W>,
}

impl TerminalReporter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TerminalReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, line: &str, newline: bool) {
        let mut out = match self.out.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = if newline { writeln!(out, "{line}") } else { write!(out, "\r{line}") };
        let _ = out.flush();
    }
}

impl<W: Write + Send> ProgressReporter for TerminalReporter<W> {
    fn report_step(&self, step: &str, message: &str) {
        self.emit(&format!("==> {}: {message}", title_case(step)), true);
    }

    fn report_progress(&self, current: usize, total: usize, message: &str) {
        let line = format!("{} {current}/{total} {message}", render_bar(current, total));
        self.emit(&line, current >= total);
    }

    fn report_completion(&self, s: &ReviewSummary) {
        self.emit("", true);
        self.emit("Review complete", true);
        self.emit(&format!("  Questions evaluated: {}/{}", s.questions_evaluated, s.total_questions), true);
        self.emit(&format!("  High risks:          {}", s.high_risks), true);
        self.emit(&format!("  Medium risks:        {}", s.medium_risks), true);
        self.emit(&format!("  Average confidence:  {:.0}%", s.average_confidence * 100.0), true);
        self.emit(&format!("  Improvement items:   {}", s.improvement_plan_items), true);
    }
}
