//! Turning a finished run invocation into the value relayed to the caller.
//!
//! The artifact owns result semantics: stdout that parses as JSON is relayed
//! byte-for-byte (key order and number spelling untouched), anything else is
//! wrapped as `{"result": "<text>"}`. Empty or cut-short stdout is an error,
//! and so is a non-zero exit when the exit policy says so.

use serde_json::value::RawValue;

use crate::config::ExitPolicy;
use crate::errors::ActionError;
use crate::invoker::Invocation;

pub fn interpret_run(
    inv: &Invocation,
    policy: ExitPolicy,
    output_limit: usize,
) -> Result<Box<RawValue>, ActionError> {
    if policy == ExitPolicy::Fail && !inv.success() {
        return Err(ActionError::ActionFailed {
            exit_code: inv.exit_code,
            stderr: inv.stderr.lossy(),
        });
    }

    if inv.stdout.truncated {
        return Err(ActionError::OutputTruncated { limit: output_limit });
    }

    if inv.stdout.is_empty() {
        return Err(ActionError::NoOutput {
            stderr: inv.stderr.lossy(),
        });
    }

    match serde_json::from_slice::<Box<RawValue>>(&inv.stdout.bytes) {
        Ok(raw) => Ok(raw),
        Err(_) => serde_json::value::to_raw_value(&serde_json::json!({ "result": inv.stdout.lossy() }))
            .map_err(|e| ActionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
    }
}
