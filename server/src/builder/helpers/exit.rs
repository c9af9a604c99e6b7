use bollard::models::ContainerWaitResponse;
use secondtry_models::ProcessState;
use tokio::time::error::Elapsed;

/// Outcome of a launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub state: ProcessState,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
}

/// Turn the result of waiting on a container into the process's final state. Only a
/// zero exit code counts as a clean exit.
pub fn process_exit_status(
    exit_result: Result<Option<Result<ContainerWaitResponse, bollard::errors::Error>>, Elapsed>,
) -> ExitStatus {
    let timed_out = exit_result.is_err();
    let exit_code = match exit_result {
        Ok(Some(Ok(res))) => Some(res.status_code),
        Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => Some(code),
        _ => None,
    };
    let state = match exit_code {
        Some(0) if !timed_out => ProcessState::Exited,
        _ => ProcessState::Crashed,
    };

    ExitStatus {
        state,
        exit_code,
        timed_out,
    }
}
