//! Terminal progress and confirmation for plan execution

use colored::Colorize;
use declarative::{ApplyResult, ConfirmCallback, Phase, ProgressCallback};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar per batch, with one line per finished change
pub struct BarProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn line(&self, msg: &str) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.suspend(|| println!("{msg}")),
            None => println!("{msg}"),
        }
    }
}

pub fn result_line(address: &str, result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => format!("  {} {address}", "○".dimmed()),
        ApplyResult::Created => format!("  {} {address} created", "✓".green()),
        ApplyResult::Modified => format!("  {} {address} updated", "✓".green()),
        ApplyResult::Replaced => format!("  {} {address} replaced", "✓".green()),
        ApplyResult::Removed => format!("  {} {address} removed", "✓".green()),
        ApplyResult::Failed { error } => format!("  {} {address}: {}", "✗".red(), error.red()),
        ApplyResult::Skipped { reason } => {
            format!("  {} {address} skipped ({reason})", "⊘".yellow())
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize, phase: Phase) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(phase.to_string());
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, address: &str, description: &str) {
        log::debug!("{address}: {description}");
        if let Some(bar) = &self.bar {
            bar.set_message(address.to_string());
        }
    }

    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult) {
        self.line(&result_line(address, result));
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Interactive confirmation unless `--yes` was given
pub struct PromptConfirm {
    pub yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        if self.yes {
            return Ok(true);
        }
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_lines() {
        colored::control::set_override(false);
        assert_eq!(
            result_line("sql_login.app", &ApplyResult::Created),
            "  ✓ sql_login.app created"
        );
        assert_eq!(
            result_line(
                "schema.sales",
                &ApplyResult::Failed {
                    error: "denied".into()
                }
            ),
            "  ✗ schema.sales: denied"
        );
    }

    #[test]
    fn test_yes_skips_prompt() {
        let mut confirm = PromptConfirm { yes: true };
        assert!(confirm.confirm("Apply 3 change(s)?").unwrap());
    }

    #[test]
    fn test_quiet_progress_draws_nothing() {
        let mut progress = BarProgress::new(true);
        progress.on_batch_start(2, Phase::Converge);
        progress.on_resource_complete("database.app", &ApplyResult::Created);
        progress.on_batch_complete();
        assert!(progress.bar.is_none());
    }
}
