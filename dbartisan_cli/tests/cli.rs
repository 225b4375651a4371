mod cli {
    use assert_cmd::prelude::*;
    use predicates::prelude::*;
    use predicates::str::contains;
    use std::fs;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn dbartisan(dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("dbartisan").unwrap();
        cmd.current_dir(dir)
            .env_remove("DATABASE_URL")
            .env_remove("DB_DRIVER")
            .env_remove("MIGRATIONS_PATH")
            .env_remove("SEEDERS_PATH");
        cmd
    }

    fn sqlite(dir: &TempDir) -> Command {
        let mut cmd = dbartisan(dir.path());
        cmd.args(["--driver", "sqlite", "-D"])
            .arg(dir.path().join("app.db"));
        cmd
    }

    fn write_migration(dir: &Path, name: &str, table: &str) {
        let migrations = dir.join("database").join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        fs::write(
            migrations.join(name),
            format!("--UP--\nCREATE TABLE {table} (id INTEGER);\n--DOWN--\nDROP TABLE {table};\n"),
        )
        .unwrap();
    }

    // `dbartisan` with no args should exit with a non-zero code.
    #[test]
    fn cli_no_args() {
        let dir = tempfile::tempdir().unwrap();
        dbartisan(dir.path()).assert().failure();
    }

    #[test]
    fn cli_version() {
        Command::cargo_bin("dbartisan")
            .unwrap()
            .args(["-V"])
            .assert()
            .stdout(contains(env!("CARGO_PKG_VERSION")));
    }

    // `dbartisan migrate` without a database URL should exit with a non-zero code.
    #[test]
    fn migrate_requires_database_url() {
        let dir = tempfile::tempdir().unwrap();
        dbartisan(dir.path())
            .args(["migrate"])
            .assert()
            .failure()
            .stderr(contains("database URL is required"));
    }

    #[test]
    fn mysql_has_no_bundled_client() {
        let dir = tempfile::tempdir().unwrap();
        dbartisan(dir.path())
            .args(["--driver", "mysql", "-D", "mysql://localhost/app", "migrate"])
            .assert()
            .failure()
            .stderr(contains("no database client available for driver `mysql`"));
    }

    #[test]
    fn migrate_status_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "2024_01_01_000000_create_users_table.sql", "users");
        write_migration(dir.path(), "2024_01_02_000000_create_posts_table.sql", "posts");

        sqlite(&dir)
            .arg("migrate")
            .assert()
            .success()
            .stdout(contains("Migrated 2024_01_01_000000_create_users_table.sql"))
            .stdout(contains("Migrated 2024_01_02_000000_create_posts_table.sql"));

        sqlite(&dir)
            .arg("migrate")
            .assert()
            .success()
            .stdout(contains("Nothing to migrate."));

        sqlite(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(contains("2024_01_02_000000_create_posts_table.sql"))
            .stdout(contains("Yes"))
            .stdout(contains("free"));

        sqlite(&dir)
            .arg("rollback")
            .assert()
            .success()
            .stdout(contains("Rolled back 2024_01_02_000000_create_posts_table.sql"))
            .stdout(contains("Rolled back 2024_01_01_000000_create_users_table.sql"));

        sqlite(&dir)
            .arg("migrate:rollback")
            .assert()
            .success()
            .stdout(contains("Nothing to rollback."));
    }

    #[test]
    fn dry_run_lists_statements() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "001_users.sql", "users");

        sqlite(&dir)
            .arg("dry-run")
            .assert()
            .success()
            .stdout(contains("001_users.sql"))
            .stdout(contains("CREATE TABLE users (id INTEGER)"));

        sqlite(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(contains("Pending"));
    }

    #[test]
    fn failed_migration_exits_non_zero() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("database").join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        fs::write(migrations.join("001_bad.sql"), "--UP--\nNOT SQL;\n--DOWN--\n").unwrap();

        sqlite(&dir)
            .arg("migrate")
            .assert()
            .failure()
            .stderr(contains("failed to run migration `001_bad.sql`"));
    }

    #[test]
    fn tracked_seed_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "001_users.sql", "users");
        let seeders = dir.path().join("database").join("seeders");
        fs::create_dir_all(&seeders).unwrap();
        fs::write(
            seeders.join("users_seeder.sql"),
            "INSERT INTO users (id) VALUES (1);\n",
        )
        .unwrap();

        sqlite(&dir).args(["migrate", "--seed"]).assert().success();
        sqlite(&dir)
            .args(["seed", "--tracked"])
            .assert()
            .success()
            .stdout(contains("Seeded users_seeder.sql"));
        sqlite(&dir)
            .args(["seed", "--tracked"])
            .assert()
            .success()
            .stdout(contains("already seeded"));
        sqlite(&dir)
            .arg("seed-status")
            .assert()
            .success()
            .stdout(contains("users_seeder.sql"));
    }

    #[test]
    fn make_migration_and_seeder() {
        let dir = tempfile::tempdir().unwrap();
        dbartisan(dir.path())
            .args(["--driver", "postgres", "make-migration", "users"])
            .assert()
            .success()
            .stdout(contains("_create_users_table.sql"));

        let migrations: Vec<_> = fs::read_dir(dir.path().join("database").join("migrations"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(migrations.len(), 1);
        let text = fs::read_to_string(&migrations[0]).unwrap();
        assert!(text.contains("-- Database: postgres"));
        assert!(text.contains("id SERIAL PRIMARY KEY"));

        dbartisan(dir.path())
            .args(["make:seeder", "users"])
            .assert()
            .success()
            .stdout(contains("users_seeder.sql"));
        assert!(dir
            .path()
            .join("database")
            .join("seeders")
            .join("users_seeder.sql")
            .is_file());

        dbartisan(dir.path())
            .args(["make-seeder", "users"])
            .assert()
            .failure()
            .stderr(contains("failed to write").and(contains("users_seeder.sql")));
    }
}
