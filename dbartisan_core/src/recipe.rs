use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use walkdir::WalkDir;

/// Marker opening the UP section of a migration file.
pub const UP_MARKER: &str = "--UP--";

/// Marker opening the DOWN section of a migration file.
pub const DOWN_MARKER: &str = "--DOWN--";

/// Extensions of program-source files left over from the code-based migration
/// format. They may share the directory with SQL recipes and are never loaded.
pub const LEGACY_SOURCE_EXTENSIONS: &[&str] = &["go"];

/// An Error occurred while discovering or parsing recipe files
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("invalid recipe path `{path}`")]
    InvalidRecipePath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid recipe file `{path}`")]
    InvalidRecipeFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("recipe file name `{path}` is not valid UTF-8")]
    InvalidFilename { path: PathBuf },

    #[error("migration file `{path}` must contain both --UP-- and --DOWN-- sections (missing `{marker}`)")]
    MissingMarker { path: PathBuf, marker: &'static str },

    #[error("migration file `{path}` has its --DOWN-- section before --UP--")]
    MisplacedMarkers { path: PathBuf },
}

/// How a block of SQL is cut into statements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum SplitMode {
    /// Split on every `;`. Semicolons inside literals or comments are not
    /// recognised, and a fragment starting with `--` is dropped whole.
    #[default]
    Naive,

    /// Split only on `;` outside quotes, dollar-quoted bodies and comments.
    /// Comments are removed from the resulting statements. Quotes follow
    /// standard SQL: a doubled quote escapes itself and backslash is an
    /// ordinary character, so MySQL `\'` escapes are not recognised.
    QuoteAware,
}

/// A migration file with both sections parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationScript {
    pub path: PathBuf,
    pub name: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl MigrationScript {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn up(&self) -> &[String] {
        &self.up
    }

    pub fn down(&self) -> &[String] {
        &self.down
    }
}

impl std::fmt::Display for MigrationScript {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{}", self.name)
    }
}

/// A seed file with its statements.
#[derive(Clone, Debug, PartialEq)]
pub struct SeedScript {
    pub path: PathBuf,
    pub name: String,
    pub statements: Vec<String>,
}

impl SeedScript {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

fn keep_statement(statement: &str) -> bool {
    !statement.is_empty() && !statement.starts_with("--")
}

/// Splits a block of SQL into trimmed, non-empty statements, in file order.
pub fn split_statements(sql: &str, mode: SplitMode) -> Vec<String> {
    let fragments = match mode {
        SplitMode::Naive => sql.trim().split(';').map(str::to_string).collect(),
        SplitMode::QuoteAware => tokenize(sql),
    };
    fragments
        .iter()
        .map(|fragment| fragment.trim())
        .filter(|fragment| keep_statement(fragment))
        .map(str::to_string)
        .collect()
}

fn dollar_tag(rest: &str) -> Option<&str> {
    static DOLLAR_TAG: OnceLock<Regex> = OnceLock::new();
    let regex = DOLLAR_TAG.get_or_init(|| {
        Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").expect("valid dollar tag pattern")
    });
    regex.find(rest).map(|m| m.as_str())
}

#[derive(Clone, Copy)]
enum State<'a> {
    Normal,
    Quoted(char),
    Dollar(&'a str),
    LineComment,
    BlockComment,
}

fn tokenize(sql: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut index = 0;

    while index < sql.len() {
        let rest = &sql[index..];
        let Some(ch) = rest.chars().next() else {
            break;
        };
        let mut advance = ch.len_utf8();

        match state {
            State::Normal => {
                if rest.starts_with("--") {
                    state = State::LineComment;
                    advance = 2;
                } else if rest.starts_with("/*") {
                    state = State::BlockComment;
                    advance = 2;
                } else if let Some(tag) = (ch == '$').then(|| dollar_tag(rest)).flatten() {
                    current.push_str(tag);
                    state = State::Dollar(tag);
                    advance = tag.len();
                } else if ch == ';' {
                    fragments.push(std::mem::take(&mut current));
                } else {
                    if matches!(ch, '\'' | '"' | '`') {
                        state = State::Quoted(ch);
                    }
                    current.push(ch);
                }
            }
            State::Quoted(quote) => {
                current.push(ch);
                if ch == quote {
                    state = State::Normal;
                }
            }
            State::Dollar(tag) => {
                if rest.starts_with(tag) {
                    current.push_str(tag);
                    advance = tag.len();
                    state = State::Normal;
                } else {
                    current.push(ch);
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    current.push('\n');
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if rest.starts_with("*/") {
                    current.push(' ');
                    advance = 2;
                    state = State::Normal;
                }
            }
        }
        index += advance;
    }
    fragments.push(current);
    fragments
}

/// Extracts the UP and DOWN statements of a migration file.
///
/// UP is the text strictly between the first `--UP--` and the first `--DOWN--`;
/// DOWN runs from the first `--DOWN--` to the end of the file.
pub fn parse_migration(
    path: &Path,
    text: &str,
    mode: SplitMode,
) -> Result<(Vec<String>, Vec<String>), RecipeError> {
    let up_index = text.find(UP_MARKER).ok_or_else(|| RecipeError::MissingMarker {
        path: path.to_path_buf(),
        marker: UP_MARKER,
    })?;
    let down_index = text
        .find(DOWN_MARKER)
        .ok_or_else(|| RecipeError::MissingMarker {
            path: path.to_path_buf(),
            marker: DOWN_MARKER,
        })?;

    let up_start = up_index + UP_MARKER.len();
    if down_index < up_start {
        return Err(RecipeError::MisplacedMarkers {
            path: path.to_path_buf(),
        });
    }

    let up = split_statements(&text[up_start..down_index], mode);
    let down = split_statements(&text[down_index + DOWN_MARKER.len()..], mode);
    Ok((up, down))
}

/// Extracts the statements of a seed file.
pub fn parse_seeder(text: &str, mode: SplitMode) -> Vec<String> {
    match mode {
        SplitMode::Naive => {
            let sql = text
                .lines()
                .filter(|line| keep_statement(line.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            split_statements(&sql, mode)
        }
        SplitMode::QuoteAware => split_statements(text, mode),
    }
}

/// Collapses whitespace and truncates a statement to `width` characters for
/// single-line display.
pub fn preview(statement: &str, width: usize) -> String {
    let collapsed = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(width.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

fn is_recipe_name(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    match Path::new(name).extension().and_then(OsStr::to_str) {
        Some(ext) => !LEGACY_SOURCE_EXTENSIONS.contains(&ext),
        None => true,
    }
}

/// Lists recipe files directly inside `location`, sorted by file name.
///
/// Subdirectories, hidden files and legacy program-source files are skipped.
pub fn find_recipe_files(location: impl AsRef<Path>) -> Result<Vec<PathBuf>, RecipeError> {
    let location: &Path = location.as_ref();
    let metadata = std::fs::metadata(location).map_err(|err| RecipeError::InvalidRecipePath {
        path: location.to_path_buf(),
        source: err,
    })?;
    if !metadata.is_dir() {
        return Err(RecipeError::InvalidRecipePath {
            path: location.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(location)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| RecipeError::InvalidRecipePath {
            path: location.to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| RecipeError::InvalidFilename {
                path: entry.path().to_path_buf(),
            })?;
        if is_recipe_name(name) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Base name of a recipe path, the identity key stored in the ledgers.
pub fn recipe_name(path: &Path) -> Result<String, RecipeError> {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(str::to_string)
        .ok_or_else(|| RecipeError::InvalidFilename {
            path: path.to_path_buf(),
        })
}

fn read_recipe(path: &Path) -> Result<String, RecipeError> {
    std::fs::read_to_string(path).map_err(|e| {
        let path = path.to_path_buf();
        match e.kind() {
            std::io::ErrorKind::NotFound => RecipeError::InvalidRecipePath { path, source: e },
            _ => RecipeError::InvalidRecipeFile { path, source: e },
        }
    })
}

/// Reads and parses a migration file.
pub fn load_migration(path: &Path, mode: SplitMode) -> Result<MigrationScript, RecipeError> {
    let name = recipe_name(path)?;
    let text = read_recipe(path)?;
    let (up, down) = parse_migration(path, &text, mode)?;
    Ok(MigrationScript {
        path: path.to_path_buf(),
        name,
        up,
        down,
    })
}

/// Reads and parses a seed file.
pub fn load_seed(path: &Path, mode: SplitMode) -> Result<SeedScript, RecipeError> {
    let name = recipe_name(path)?;
    let text = read_recipe(path)?;
    Ok(SeedScript {
        path: path.to_path_buf(),
        name,
        statements: parse_seeder(&text, mode),
    })
}
