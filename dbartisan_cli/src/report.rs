//! Console rendering of engine progress

use console::{Style, StyledObject, Term};
use dbartisan::{Event, Reporter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Prints one line per event and drives a progress bar while migrating on a
/// terminal. Clones share the same bar.
#[derive(Clone)]
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter {
            bar: ProgressBar::hidden(),
        }
    }

    fn line(&self, label: StyledObject<&str>, text: &str) {
        let line = format!("{:>12} {}", label, text);
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    fn start(&self, count: usize) {
        let template = if Term::stdout().size().1 > 80 {
            "{prefix:>12.cyan.bold} [{bar:57}] {pos}/{len} {wide_msg}"
        } else {
            "{prefix:>12.cyan.bold} [{bar:57}] {pos}/{len}"
        };
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        self.bar.set_style(style);
        self.bar.set_length(count as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Migrating");
        if Term::stderr().is_term() {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
    }

    /// Removes the progress bar, if one is shown.
    pub fn clear(&self) {
        if !self.bar.is_hidden() {
            self.bar.finish_and_clear();
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: Event<'_>) {
        let green_bold = Style::new().green().bold();
        let yellow_bold = Style::new().yellow().bold();
        let cyan_bold = Style::new().cyan().bold();
        match event {
            Event::Pending { count } => self.start(count),
            Event::Migrated { name } => {
                self.line(green_bold.apply_to("Migrated"), name);
                self.bar.inc(1);
            }
            Event::NothingToMigrate => {
                self.line(green_bold.apply_to("Finished"), "Nothing to migrate.")
            }
            Event::RolledBack { name } => self.line(green_bold.apply_to("Rolled back"), name),
            Event::MissingFile { name } => self.line(
                yellow_bold.apply_to("Missing"),
                &format!("{name} (file not found, removed from ledger)"),
            ),
            Event::NothingToRollback => {
                self.line(green_bold.apply_to("Finished"), "Nothing to rollback.")
            }
            Event::Seeded { name } => self.line(green_bold.apply_to("Seeded"), name),
            Event::AlreadySeeded { name } => self.line(
                cyan_bold.apply_to("Skipped"),
                &format!("{name} (already seeded)"),
            ),
            Event::NothingToSeed => self.line(green_bold.apply_to("Finished"), "Nothing to seed."),
        }
    }
}
