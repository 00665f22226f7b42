use crate::error::{InferenceError, Result, VentError};
use crate::inference::{BreathClassifier, PressureReconstructor};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

/// Seed exported to model processes so repeated runs give identical output
pub const MODEL_SEED: u64 = 7;
pub const SEED_ENV_VAR: &str = "VENTMECH_SEED";
/// How long a request waits for its response line
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type ResponseLine = std::io::Result<String>;

struct ModelProcess {
    child: Child,
    stdin: ChildStdin,
    responses: Receiver<ResponseLine>,
}

impl ModelProcess {
    fn start(command: &str) -> Result<Self> {
        // Windows: cmd /C; Unix (macOS/Linux): sh -c
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };

        cmd.env(SEED_ENV_VAR, MODEL_SEED.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        log::info!("Starting model process: {}", command);
        let mut child = cmd
            .spawn()
            .map_err(|e| VentError::ModelError(format!("failed to start '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VentError::ModelError("model process has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VentError::ModelError("model process has no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || forward_lines(stdout, tx));

        Ok(Self {
            child,
            stdin,
            responses: rx,
        })
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("Model process already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}

/// Reader thread: one channel message per stdout line, until EOF
fn forward_lines(stdout: ChildStdout, tx: Sender<ResponseLine>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// Model collaborator backed by a long-lived serving process.
///
/// Each request is one line of comma-separated floats on the process stdin
/// and each response one line on its stdout: a class index for
/// classification, a comma-separated curve for reconstruction. Requests are
/// serialized, so one instance can be shared across batch workers.
///
/// A request that gets no answer within the timeout fails with
/// [`InferenceError::Timeout`]; the process is killed and started again on
/// the next request. Lines the process wrote outside a request are dropped
/// before the next request is sent.
pub struct ExternalModel {
    command: String,
    timeout: Duration,
    process: Mutex<Option<ModelProcess>>,
}

impl ExternalModel {
    /// Start `command` through the platform shell
    pub fn spawn(command: &str) -> Result<Self> {
        Self::spawn_with_timeout(command, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn spawn_with_timeout(command: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            command: command.to_string(),
            timeout,
            process: Mutex::new(Some(ModelProcess::start(command)?)),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request line and wait for one response line
    fn request(&self, input: &[f64]) -> std::result::Result<String, InferenceError> {
        let line = input
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut guard = self
            .process
            .lock()
            .map_err(|_| InferenceError::Model("model process lock poisoned".to_string()))?;

        if guard.is_none() {
            log::info!("Restarting model process: {}", self.command);
            let process = ModelProcess::start(&self.command)
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            *guard = Some(process);
        }
        let process = guard
            .as_mut()
            .ok_or_else(|| InferenceError::Model("model process unavailable".to_string()))?;

        let stale = process.responses.try_iter().count();
        if stale > 0 {
            log::warn!("Dropped {} unrequested line(s) from '{}'", stale, self.command);
        }

        let outcome = exchange(process, &line, self.timeout);
        if let Err(ref e) = outcome {
            log::warn!("Model '{}' failed, stopping it: {}", self.command, e);
            if let Some(mut process) = guard.take() {
                process.stop();
            }
        }
        outcome.map_err(|e| match e {
            InferenceError::Model(msg) => {
                InferenceError::Model(format!("'{}': {}", self.command, msg))
            }
            other => other,
        })
    }
}

fn exchange(
    process: &mut ModelProcess,
    line: &str,
    timeout: Duration,
) -> std::result::Result<String, InferenceError> {
    writeln!(process.stdin, "{}", line)?;
    process.stdin.flush()?;

    match process.responses.recv_timeout(timeout) {
        Ok(response) => Ok(response?.trim().to_string()),
        Err(RecvTimeoutError::Timeout) => Err(InferenceError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(InferenceError::Model("process closed its output".to_string()))
        }
    }
}

impl BreathClassifier for ExternalModel {
    fn classify(&self, input: &[f64]) -> std::result::Result<i64, InferenceError> {
        let response = self.request(input)?;
        response
            .parse::<i64>()
            .map_err(|_| InferenceError::Model(format!("expected a class index, got '{}'", response)))
    }
}

impl PressureReconstructor for ExternalModel {
    fn reconstruct(&self, input: &[f64]) -> std::result::Result<Vec<f64>, InferenceError> {
        let response = self.request(input)?;
        response
            .split(',')
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| {
                    InferenceError::Model(format!("unparsable reconstruction value '{}'", field))
                })
            })
            .collect()
    }
}

impl Drop for ExternalModel {
    fn drop(&mut self) {
        if let Ok(Some(process)) = self.process.get_mut() {
            process.stop();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_classifier_process_answers_every_request() {
        let model = ExternalModel::spawn("while read line; do echo 1; done").unwrap();
        assert_eq!(model.classify(&[0.0, 0.5, 1.0]).unwrap(), 1);
        assert_eq!(model.classify(&[1.0, 0.5, 0.0]).unwrap(), 1);
    }

    #[test]
    fn test_reconstructor_process_echo() {
        let model = ExternalModel::spawn("while read line; do echo \"$line\"; done").unwrap();
        let input = vec![0.0, 0.25, 0.125, 1.0];
        assert_eq!(model.reconstruct(&input).unwrap(), input);
    }

    #[test]
    fn test_seed_is_exported() {
        let model = ExternalModel::spawn("read line; echo $VENTMECH_SEED").unwrap();
        assert_eq!(model.classify(&[1.0]).unwrap(), 7);
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        let model = ExternalModel::spawn("while read line; do echo abc; done").unwrap();
        assert!(matches!(model.classify(&[1.0]), Err(InferenceError::Model(_))));
        assert!(model.reconstruct(&[1.0]).is_err());
    }

    #[test]
    fn test_exited_process_is_an_error() {
        let model = ExternalModel::spawn("exit 0").unwrap();
        assert!(model.classify(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_silent_process_times_out() {
        let model =
            ExternalModel::spawn_with_timeout("read l; sleep 5", Duration::from_millis(300)).unwrap();
        let start = Instant::now();
        let result = model.classify(&[1.0]);

        assert!(matches!(result, Err(InferenceError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_stalled_process_is_restarted() {
        // answers every request except "9", which stalls
        let cmd = "while read l; do if [ \"$l\" = 9 ]; then sleep 5; else echo 1; fi; done";
        let model = ExternalModel::spawn_with_timeout(cmd, Duration::from_millis(300)).unwrap();

        assert!(matches!(model.classify(&[9.0]), Err(InferenceError::Timeout(_))));
        assert_eq!(model.classify(&[1.0]).unwrap(), 1);
        assert_eq!(model.classify(&[2.0]).unwrap(), 1);
    }

    #[test]
    fn test_unrequested_lines_are_dropped() {
        let model = ExternalModel::spawn("while read l; do echo 1; echo 2; done").unwrap();
        assert_eq!(model.classify(&[0.5]).unwrap(), 1);
        std::thread::sleep(Duration::from_millis(200));
        // the trailing "2" of the first answer must not answer this request
        assert_eq!(model.classify(&[0.5]).unwrap(), 1);
    }
}
