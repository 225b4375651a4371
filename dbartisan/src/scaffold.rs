//! Templates for new migration and seeder files.

use crate::migrator::MigratorError;
use dbartisan_core::Dialect;
use handlebars::Handlebars;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

const MIGRATION_TEMPLATE: &str = "\
-- Migration: {{name}}
-- Created at: {{created_at}}
-- Database: {{dialect}}

--UP--
{{up}}

--DOWN--
{{down}}
";

const SEEDER_TEMPLATE: &str = "\
-- Seeder: {{name}}

-- Add your INSERT statements here
-- Example:
-- INSERT INTO users (name, email, password) VALUES
--   ('John Doe', 'john@example.com', 'hashed_password'),
--   ('Jane Smith', 'jane@example.com', 'hashed_password');
";

fn render(template: &str, data: &BTreeMap<&str, String>) -> Result<String, MigratorError> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);
    Ok(handlebars.render_template(template, data)?)
}

fn check_name(name: &str) -> Result<(), MigratorError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(MigratorError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Creates `path` with `content`, refusing to overwrite an existing file.
fn write_new(path: &Path, content: &str) -> Result<(), MigratorError> {
    let io_err = |source| MigratorError::Scaffold {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    Ok(())
}

/// Writes `<dir>/YYYY_MM_DD_HHMMSS_<name>.sql` holding create and drop
/// statements for `table`, and returns its path.
pub fn make_migration(
    dir: impl AsRef<Path>,
    dialect: Dialect,
    table: &str,
    name: &str,
    now: OffsetDateTime,
) -> Result<PathBuf, MigratorError> {
    check_name(table)?;
    let name = name.strip_suffix(".sql").unwrap_or(name);
    check_name(name)?;
    let stamp = now.format(format_description!(
        "[year]_[month]_[day]_[hour][minute][second]"
    ))?;
    let file_name = format!("{stamp}_{name}.sql");

    let data = BTreeMap::from([
        ("name", file_name.clone()),
        (
            "created_at",
            now.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))?,
        ),
        ("dialect", dialect.to_string()),
        ("up", dialect.create_table_template(table)),
        ("down", dialect.drop_table_template(table)),
    ]);
    let content = render(MIGRATION_TEMPLATE, &data)?;

    let path = dir.as_ref().join(file_name);
    write_new(&path, &content)?;
    log::info!("created migration {}", path.display());
    Ok(path)
}

/// Writes `<dir>/<name>_seeder.sql`; the `_seeder` suffix is added when
/// missing.
pub fn make_seeder(dir: impl AsRef<Path>, name: &str) -> Result<PathBuf, MigratorError> {
    let name = name.strip_suffix(".sql").unwrap_or(name);
    check_name(name)?;
    let name = if name.ends_with("_seeder") {
        name.to_string()
    } else {
        format!("{name}_seeder")
    };

    let data = BTreeMap::from([("name", name.clone())]);
    let content = render(SEEDER_TEMPLATE, &data)?;

    let path = dir.as_ref().join(format!("{name}.sql"));
    write_new(&path, &content)?;
    log::info!("created seeder {}", path.display());
    Ok(path)
}
