//! VM subprocess invocation and tool-version discovery.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Tool version for output banners: `git describe --always` when run from
/// a checkout, the crate version otherwise.
pub fn tool_version() -> String {
    if let Ok(out) = Command::new("git").args(["describe", "--always"]).output() {
        if out.status.success() {
            let v = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !v.is_empty() {
                return v;
            }
        }
    }
    format!("v{}", env!("CARGO_PKG_VERSION"))
}

/// Run the VM with maximum verbosity on a compiled module and capture the
/// disassembly from stdout.
///
/// A non-zero exit with recognizable output is not fatal: the module is
/// disassembled, not run, so runtime failures on stderr are expected and
/// only logged at debug level. A spawn failure, non-UTF-8 stdout, or
/// output with no `File ` marker is `Error::VmInvocation`.
pub fn disassemble(vm: &Path, module: &Path) -> Result<String> {
    debug!("invoking {} on {}", vm.display(), module.display());
    let output = Command::new(vm)
        .args(["-v", "-v", "-v", "-v", "-m"])
        .arg(module)
        .output()
        .map_err(|e| Error::VmInvocation(format!("cannot run '{}': {}", vm.display(), e)))?;

    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!("vm stderr: {}", line);
    }

    let stdout = String::from_utf8(output.stdout).map_err(|e| {
        Error::VmInvocation(format!("non-UTF-8 output from '{}': {}", vm.display(), e))
    })?;
    if !stdout.contains("File ") {
        return Err(Error::VmInvocation(format!(
            "no recognizable disassembly for '{}' (exit: {})",
            module.display(),
            output.status
        )));
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write a stub "vm" shell script into `dir` and make it executable.
    fn stub_vm(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("vm.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_spawn_failure() {
        let err = disassemble(Path::new("/nonexistent/micropython"), Path::new("a.mpy"))
            .unwrap_err();
        match err {
            Error::VmInvocation(msg) => assert!(msg.contains("cannot run")),
            other => panic!("expected VmInvocation, got {other:?}"),
        }
    }

    #[test]
    fn test_output_without_file_marker() {
        let dir = tempfile::tempdir().unwrap();
        let vm = stub_vm(dir.path(), "echo 'hello world'");
        let err = disassemble(&vm, Path::new("a.mpy")).unwrap_err();
        match err {
            Error::VmInvocation(msg) => {
                assert!(msg.contains("no recognizable disassembly"));
            }
            other => panic!("expected VmInvocation, got {other:?}"),
        }
    }

    #[test]
    fn test_non_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let vm = stub_vm(dir.path(), "printf 'File \\377\\376'");
        let err = disassemble(&vm, Path::new("a.mpy")).unwrap_err();
        match err {
            Error::VmInvocation(msg) => assert!(msg.contains("non-UTF-8")),
            other => panic!("expected VmInvocation, got {other:?}"),
        }
    }

    #[test]
    fn test_nonzero_exit_with_valid_output_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let vm = stub_vm(
            dir.path(),
            "echo 'File a.py, code block x'\necho 'import failed' >&2\nexit 1",
        );
        let stdout = disassemble(&vm, Path::new("a.mpy")).unwrap();
        assert!(stdout.contains("File a.py"));
    }

    #[test]
    fn test_tool_version_not_empty() {
        assert!(!tool_version().is_empty());
    }
}
