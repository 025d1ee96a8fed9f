//! Shared fixture for end-to-end harness tests.
//!
//! Builds a throwaway workspace with shell scripts standing in for the
//! reference interpreter, the compiler and the linker:
//!
//! - the reference echoes the program text back,
//! - the compiler copies `<name>.scheme` to `<name>.ll`, rejects names
//!   containing `bad`, and miscompiles names containing `wrong`,
//! - the linker writes an executable script that prints the IR file; for
//!   names containing `crash` the script then exits 3, for names containing
//!   `hang` it sleeps instead of printing.
//!
//! A correct compile therefore reproduces the reference output exactly.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

const REFERENCE: &str = "#!/bin/sh\nexec cat\n";

const COMPILER: &str = r#"#!/bin/sh
src="$1"
ir="${src%.scheme}.ll"
case "$(basename "$src")" in
  *bad*) echo "unexpected token ')'" >&2; exit 1 ;;
  *wrong*) printf '(display 4)' > "$ir" ;;
  *) cp "$src" "$ir" ;;
esac
"#;

const LINKER: &str = r#"#!/bin/sh
ir="$1"
out="$4"
case "$(basename "$ir")" in
  *crash*) printf '#!/bin/sh\ncat "%s"\nexit 3\n' "$ir" > "$out" ;;
  *hang*) printf '#!/bin/sh\nsleep 30\n' > "$out" ;;
  *) printf '#!/bin/sh\ncat "%s"\n' "$ir" > "$out" ;;
esac
chmod +x "$out"
"#;

pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("programs")).unwrap();
        let fixture = Self { root };
        fixture.script("reference.sh", REFERENCE);
        fixture.script("compiler.sh", COMPILER);
        fixture.script("linker.sh", LINKER);
        fixture
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.path("programs")
    }

    pub fn program(&self, name: &str, text: &str) -> &Self {
        fs::write(self.corpus_dir().join(format!("{name}.scheme")), text).unwrap();
        self
    }

    pub fn config(&self, yaml: &str) -> PathBuf {
        let path = self.path("harness.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    pub fn executable(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// The harness binary, run from the fixture root with the fake tools wired in.
    pub fn harness(&self, subcommand: &str) -> Command {
        self.command(subcommand, &self.path("reference.sh"), 20)
    }

    pub fn harness_with_reference(&self, subcommand: &str, reference: &Path) -> Command {
        self.command(subcommand, reference, 20)
    }

    pub fn harness_with_timeout(&self, subcommand: &str, secs: u64) -> Command {
        self.command(subcommand, &self.path("reference.sh"), secs)
    }

    fn command(&self, subcommand: &str, reference: &Path, timeout_secs: u64) -> Command {
        let mut cmd = Command::cargo_bin("compilisp-harness").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("RUST_LOG")
            .arg(subcommand)
            .arg("--corpus-dir")
            .arg(self.corpus_dir())
            .arg("--reference")
            .arg(reference)
            .arg("--compiler")
            .arg(self.path("compiler.sh"))
            .arg("--linker")
            .arg(self.path("linker.sh"))
            .arg("--runtime")
            .arg(self.path("libruntime.a"))
            .arg("--timeout")
            .arg(timeout_secs.to_string());
        cmd
    }

    fn script(&self, name: &str, body: &str) {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
}
