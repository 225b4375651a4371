use std::fmt;

/// Progress notifications emitted by [`Migrator`](crate::Migrator) and
/// [`Seeder`](crate::Seeder).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event<'a> {
    Pending { count: usize },
    Migrated { name: &'a str },
    NothingToMigrate,
    RolledBack { name: &'a str },
    /// The ledger row was removed without running any DOWN statements.
    MissingFile { name: &'a str },
    NothingToRollback,
    Seeded { name: &'a str },
    AlreadySeeded { name: &'a str },
    NothingToSeed,
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Event::Pending { count } => write!(f, "Running {count} migration(s)"),
            Event::Migrated { name } => write!(f, "Migrated: {name}"),
            Event::NothingToMigrate => f.write_str("Nothing to migrate."),
            Event::RolledBack { name } => write!(f, "Rolled back: {name}"),
            Event::MissingFile { name } => {
                write!(f, "Migration file not found, removed from ledger: {name}")
            }
            Event::NothingToRollback => f.write_str("Nothing to rollback."),
            Event::Seeded { name } => write!(f, "Seeded: {name}"),
            Event::AlreadySeeded { name } => write!(f, "Skipped (already seeded): {name}"),
            Event::NothingToSeed => f.write_str("Nothing to seed."),
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: Event<'_>);
}

impl<R: Reporter + ?Sized> Reporter for std::sync::Arc<R> {
    fn report(&self, event: Event<'_>) {
        self.as_ref().report(event)
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Reporter for Silent {
    fn report(&self, _event: Event<'_>) {}
}

/// Forwards events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: Event<'_>) {
        match event {
            Event::MissingFile { .. } => log::warn!("{}", event),
            _ => log::info!("{}", event),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects rendered events.
    #[derive(Default)]
    pub(crate) struct Recorder(pub Mutex<Vec<String>>);

    impl Reporter for Recorder {
        fn report(&self, event: Event<'_>) {
            self.0.lock().unwrap().push(event.to_string());
        }
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            Event::Migrated { name: "a.sql" }.to_string(),
            "Migrated: a.sql"
        );
        assert_eq!(Event::NothingToRollback.to_string(), "Nothing to rollback.");
        assert_eq!(
            Event::AlreadySeeded { name: "users_seeder.sql" }.to_string(),
            "Skipped (already seeded): users_seeder.sql"
        );
    }
}
