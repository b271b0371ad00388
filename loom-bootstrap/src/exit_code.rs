// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Unix-style exit code mapping.
//!
//! The CLI always exits 0 on quiescent termination, even if individual
//! ids failed along the way — per-id failures are logged and simply leave
//! no committed row, to be retried on a later run.

use std::process::ExitCode as StdExitCode;

/// Process exit codes, modeled on the BSD `sysexits.h` convention the
/// rest of this codebase favors for CLI tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful, quiescent termination.
    Ok,
    /// Command-line usage error (`EX_USAGE`).
    Usage,
    /// Input data was incorrect (`EX_DATAERR`).
    DataError,
    /// Could not open the project store (`EX_NOINPUT`).
    NoInput,
    /// Internal software error (`EX_SOFTWARE`).
    Software,
}

impl ExitCode {
    fn code(self) -> u8 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::Usage => 64,
            ExitCode::DataError => 65,
            ExitCode::NoInput => 66,
            ExitCode::Software => 70,
        }
    }
}

impl From<ExitCode> for StdExitCode {
    fn from(value: ExitCode) -> Self {
        StdExitCode::from(value.code())
    }
}

/// Map a top-level `anyhow::Error` to an exit code, logging it first.
pub fn map_error_to_exit_code(err: &anyhow::Error) -> ExitCode {
    tracing::error!("fatal: {err:#}");
    ExitCode::Software
}

/// Collapse a top-level result into a process exit code. Per §7 of the
/// design, the Dispatcher itself never fails on a bad input id — only a
/// genuine setup or I/O error reaches this boundary.
pub fn result_to_exit_code(result: anyhow::Result<()>) -> StdExitCode {
    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => map_error_to_exit_code(&e).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_maps_to_zero() {
        let code: StdExitCode = ExitCode::Ok.into();
        assert_eq!(format!("{code:?}"), format!("{:?}", StdExitCode::from(0)));
    }

    #[test]
    fn err_maps_to_software_failure() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("boom"));
        let code = result_to_exit_code(result);
        assert_eq!(format!("{code:?}"), format!("{:?}", StdExitCode::from(70)));
    }
}
