use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::channel::mpsc::{self, UnboundedSender};
use futures::{stream::BoxStream, FutureExt, StreamExt};
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;

use crate::{
    config::Settings,
    domain::{AppError, ToolBinary},
    tool::process,
    utils::{is_executable, is_supported_url},
};

const PROGRESS_PATTERN: &str = r"^\[download\]\s+(\d+(?:\.\d+)?)%";

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Status(String),
    /// 0.0 to 1.0
    Progress(f32),
    Completed(String),
    Failed(String),
}

struct ActiveJob {
    url: String,
    cancel: Option<oneshot::Sender<()>>,
}

type JobSlot = Arc<Mutex<Option<ActiveJob>>>;

/// Empties the job slot when the job ends, however it ends.
struct JobGuard {
    slot: JobSlot,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Some(job) = self.slot.lock().take() {
            log::debug!("Job slot released for {}", job.url);
        }
    }
}

/// Runs yt-dlp for one URL at a time.
///
/// The job slot is only reachable through [`submit`](Self::submit) and
/// [`cancel`](Self::cancel); a submit while a job is active is rejected.
#[derive(Default)]
pub struct DownloadInvoker {
    tool: Option<ToolBinary>,
    slot: JobSlot,
}

impl DownloadInvoker {
    pub fn new(tool: Option<ToolBinary>) -> Self {
        Self {
            tool,
            slot: JobSlot::default(),
        }
    }

    pub fn set_tool(&mut self, tool: Option<ToolBinary>) {
        self.tool = tool;
    }

    pub fn tool(&self) -> Option<&ToolBinary> {
        self.tool.as_ref()
    }

    /// True when the resolved binary is still present and executable.
    pub fn is_tool_available(&self) -> bool {
        self.tool.as_ref().is_some_and(|t| is_executable(&t.path))
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Validates the request and claims the job slot.
    ///
    /// The returned stream drives the job; it yields status and progress
    /// events followed by exactly one `Completed` or `Failed`.
    pub fn submit(
        &self,
        url: &str,
        settings: &Settings,
    ) -> Result<BoxStream<'static, DownloadEvent>, AppError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(AppError::Busy);
        }

        let tool = self
            .tool
            .as_ref()
            .filter(|t| is_executable(&t.path))
            .ok_or_else(|| {
                AppError::Unavailable("yt-dlp was not found or cannot be executed".to_string())
            })?;

        let url = url.trim();
        if !is_supported_url(url) {
            return Err(AppError::InvalidInput);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *slot = Some(ActiveJob {
            url: url.to_string(),
            cancel: Some(cancel_tx),
        });
        drop(slot);

        let job = Job {
            program: tool.path.clone(),
            output_dir: settings.output_directory.clone(),
            args: build_args(settings, url),
        };
        let guard = JobGuard {
            slot: Arc::clone(&self.slot),
        };

        let (events, receiver) = mpsc::unbounded();
        Ok(futures::stream::once(async move {
            tokio::spawn(job.run(events, cancel_rx, guard));
            receiver
        })
        .flatten()
        .boxed())
    }

    /// Asks the running yt-dlp process to stop. Returns false when there is
    /// nothing to cancel.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_mut().and_then(|job| job.cancel.take()) {
            Some(cancel) => cancel.send(()).is_ok(),
            None => false,
        }
    }
}

/// yt-dlp arguments for an MP3 extraction of `url`.
pub fn build_args(settings: &Settings, url: &str) -> Vec<String> {
    let template = settings.output_directory.join("%(title)s.%(ext)s");
    vec![
        "-x".to_string(),
        "--audio-format".to_string(),
        "mp3".to_string(),
        "--audio-quality".to_string(),
        format!("{}K", settings.mp3_bitrate.kbps()),
        "--embed-thumbnail".to_string(),
        "--add-metadata".to_string(),
        "--newline".to_string(),
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
        url.to_string(),
    ]
}

/// Percentage from a `[download]  42.0% of ...` line.
pub fn parse_progress(re: &Regex, line: &str) -> Option<f32> {
    let caps = re.captures(line.trim_start())?;
    caps[1].parse::<f32>().ok().map(|pct| (pct / 100.0).clamp(0.0, 1.0))
}

struct Job {
    program: PathBuf,
    output_dir: PathBuf,
    args: Vec<String>,
}

impl Job {
    async fn run(
        self,
        events: UnboundedSender<DownloadEvent>,
        mut cancel: oneshot::Receiver<()>,
        guard: JobGuard,
    ) {
        let outcome = AssertUnwindSafe(self.execute(&events, &mut cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(format!(
                    "Unexpected error during download: {}",
                    panic_message(panic.as_ref())
                ))
            });

        drop(guard);

        let event = match outcome {
            Ok(message) => {
                log::info!("Download finished");
                DownloadEvent::Completed(message)
            }
            Err(message) => {
                log::warn!("Download failed: {}", message);
                DownloadEvent::Failed(message)
            }
        };
        let _ = events.unbounded_send(event);
    }

    async fn execute(
        &self,
        events: &UnboundedSender<DownloadEvent>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Result<String, String> {
        let _ = events.unbounded_send(DownloadEvent::Status("Preparing download...".to_string()));

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| format!("Failed to create output directory: {}", e))?;

        let mut child = process::command(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|e| format!("Failed to start yt-dlp: {}", e))?;
        log::info!("Started yt-dlp (pid {:?}): {:?}", child.id(), self.args);

        let _ = events.unbounded_send(DownloadEvent::Status("Downloading...".to_string()));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let wait = async {
            tokio::select! {
                status = child.wait() => (status, false),
                Ok(()) = cancel => {
                    log::info!("Cancelling yt-dlp");
                    terminate(&mut child).await;
                    (child.wait().await, true)
                }
            }
        };
        let ((status, cancelled), stdout_text, stderr_text) = tokio::join!(
            wait,
            read_stdout(stdout, events.clone()),
            read_all(stderr)
        );

        let status = status.map_err(|e| format!("Failed to wait for yt-dlp: {}", e))?;
        log::info!("yt-dlp exited with {}", status);

        if cancelled {
            return Err("Download cancelled".to_string());
        }
        if status.success() {
            return Ok("Download completed successfully".to_string());
        }

        let message = [stderr_text.trim(), stdout_text.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
            .unwrap_or("Unknown error");
        Err(message.to_string())
    }
}

async fn read_stdout<R>(pipe: Option<R>, events: UnboundedSender<DownloadEvent>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return String::new();
    };
    let progress_re = Regex::new(PROGRESS_PATTERN).ok();

    // Lossy per line: titles are not always UTF-8 and the pipe must be
    // drained to EOF or yt-dlp dies on SIGPIPE.
    let mut text = String::new();
    let mut reader = BufReader::new(pipe);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("Failed to read yt-dlp output: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(progress) = progress_re.as_ref().and_then(|re| parse_progress(re, line)) {
            let _ = events.unbounded_send(DownloadEvent::Progress(progress));
        }
        text.push_str(line);
        text.push('\n');
    }
    text
}

async fn read_all<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut text = String::new();
    if let Some(mut pipe) = pipe {
        let mut raw = Vec::new();
        if pipe.read_to_end(&mut raw).await.is_ok() {
            text = String::from_utf8_lossy(&raw).into_owned();
        }
    }
    text
}

/// Asks yt-dlp to stop so it can tear down its ffmpeg child and flush
/// partial files. Falls back to a kill when no terminate signal is available.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        match tokio::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await
        {
            Ok(status) if status.success() => return,
            Ok(status) => log::warn!("kill -TERM {} exited with {}", pid, status),
            Err(e) => log::warn!("Failed to send SIGTERM to yt-dlp: {}", e),
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bitrate;
    use tempfile::TempDir;

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            output_directory: dir.path().join("out"),
            ..Settings::default()
        }
    }

    #[test]
    fn test_build_args() {
        let settings = Settings {
            mp3_bitrate: Bitrate::Kbps320,
            output_directory: PathBuf::from("music"),
            ..Settings::default()
        };
        let args = build_args(&settings, VIDEO_URL);
        let template = PathBuf::from("music").join("%(title)s.%(ext)s");
        assert_eq!(
            args,
            vec![
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "320K",
                "--embed-thumbnail",
                "--add-metadata",
                "--newline",
                "-o",
                template.to_str().unwrap(),
                VIDEO_URL,
            ]
        );
    }

    #[test]
    fn test_parse_progress() {
        let re = Regex::new(PROGRESS_PATTERN).unwrap();
        assert_eq!(
            parse_progress(&re, "[download]  42.0% of 3.21MiB at 1.2MiB/s ETA 00:02"),
            Some(0.42)
        );
        assert_eq!(parse_progress(&re, "[download] 100% of 3.21MiB"), Some(1.0));
        assert_eq!(parse_progress(&re, "[ExtractAudio] Destination: a.mp3"), None);
    }

    #[test]
    fn test_cancel_without_job_is_noop() {
        let invoker = DownloadInvoker::default();
        assert!(!invoker.cancel());
        assert!(!invoker.is_active());
    }

    #[test]
    fn test_rejects_without_tool() {
        let dir = TempDir::new().unwrap();
        let invoker = DownloadInvoker::default();
        let result = invoker.submit(VIDEO_URL, &settings_in(&dir));
        assert!(matches!(result, Err(AppError::Unavailable(_))));
        assert!(!invoker.is_active());
    }

    #[cfg(unix)]
    mod process_tests {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        struct FakeTool {
            dir: TempDir,
            path: PathBuf,
        }

        impl FakeTool {
            fn new(body: &str) -> Self {
                let dir = TempDir::new().unwrap();
                let path = dir.path().join("yt-dlp");
                let script = format!(
                    "#!/bin/sh\necho \"$@\" >> '{}'\n{}\n",
                    dir.path().join("calls.log").display(),
                    body
                );
                std::fs::write(&path, script).unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
                Self { dir, path }
            }

            fn invoker(&self) -> DownloadInvoker {
                DownloadInvoker::new(Some(ToolBinary::new(self.path.clone())))
            }

            fn calls(&self) -> Vec<String> {
                std::fs::read_to_string(self.dir.path().join("calls.log"))
                    .unwrap_or_default()
                    .lines()
                    .map(str::to_string)
                    .collect()
            }
        }

        fn terminal_events(events: &[DownloadEvent]) -> Vec<&DownloadEvent> {
            events
                .iter()
                .filter(|e| matches!(e, DownloadEvent::Completed(_) | DownloadEvent::Failed(_)))
                .collect()
        }

        #[tokio::test]
        async fn test_successful_job_completes_once() {
            let tool = FakeTool::new("echo '[download]  50.0% of 3.00MiB'\nexit 0");
            let out = TempDir::new().unwrap();
            let settings = settings_in(&out);
            let invoker = tool.invoker();

            let events: Vec<_> = invoker
                .submit(VIDEO_URL, &settings)
                .unwrap()
                .collect()
                .await;

            assert_eq!(
                terminal_events(&events),
                vec![&DownloadEvent::Completed(
                    "Download completed successfully".to_string()
                )]
            );
            assert!(events.contains(&DownloadEvent::Progress(0.5)));
            assert!(!invoker.is_active());
            assert!(settings.output_directory.is_dir());

            let calls = tool.calls();
            assert_eq!(calls.len(), 1);
            assert!(calls[0].starts_with("-x --audio-format mp3 --audio-quality 192K"));
            assert!(calls[0].ends_with(VIDEO_URL));
        }

        #[tokio::test]
        async fn test_failed_job_reports_stderr_once() {
            let tool = FakeTool::new("echo 'ERROR: Video unavailable' >&2\nexit 1");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let events: Vec<_> = invoker
                .submit(VIDEO_URL, &settings_in(&out))
                .unwrap()
                .collect()
                .await;

            assert_eq!(
                terminal_events(&events),
                vec![&DownloadEvent::Failed("ERROR: Video unavailable".to_string())]
            );
            assert!(!invoker.is_active());
        }

        #[tokio::test]
        async fn test_silent_failure_is_unknown_error() {
            let tool = FakeTool::new("exit 2");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let events: Vec<_> = invoker
                .submit(VIDEO_URL, &settings_in(&out))
                .unwrap()
                .collect()
                .await;

            assert_eq!(
                events.last(),
                Some(&DownloadEvent::Failed("Unknown error".to_string()))
            );
        }

        #[tokio::test]
        async fn test_second_submit_is_busy() {
            let tool = FakeTool::new("sleep 1\nexit 0");
            let out = TempDir::new().unwrap();
            let settings = settings_in(&out);
            let invoker = tool.invoker();

            let first = invoker.submit(VIDEO_URL, &settings).unwrap();
            assert!(invoker.is_active());
            assert!(matches!(
                invoker.submit("https://youtu.be/dQw4w9WgXcQ", &settings),
                Err(AppError::Busy)
            ));

            let events: Vec<_> = first.collect().await;
            assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
            assert_eq!(tool.calls().len(), 1);

            // The slot is free again once the job is done.
            let again: Vec<_> = invoker
                .submit(VIDEO_URL, &settings)
                .unwrap()
                .collect()
                .await;
            assert!(matches!(again.last(), Some(DownloadEvent::Completed(_))));
            assert_eq!(tool.calls().len(), 2);
        }

        #[tokio::test]
        async fn test_invalid_url_spawns_nothing() {
            let tool = FakeTool::new("exit 0");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            for url in ["", "   ", "https://invalid-url.com", "not-a-url"] {
                assert!(matches!(
                    invoker.submit(url, &settings_in(&out)),
                    Err(AppError::InvalidInput)
                ));
            }
            assert!(!invoker.is_active());
            assert!(tool.calls().is_empty());
        }

        #[tokio::test]
        async fn test_tool_rechecked_before_each_submit() {
            let tool = FakeTool::new("exit 0");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();
            assert!(invoker.is_tool_available());

            std::fs::remove_file(&tool.path).unwrap();
            assert!(matches!(
                invoker.submit(VIDEO_URL, &settings_in(&out)),
                Err(AppError::Unavailable(_))
            ));
        }

        #[tokio::test]
        async fn test_cancel_stops_running_job() {
            let tool = FakeTool::new("exec sleep 5");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let mut stream = invoker.submit(VIDEO_URL, &settings_in(&out)).unwrap();
            while let Some(event) = stream.next().await {
                if event == DownloadEvent::Status("Downloading...".to_string()) {
                    break;
                }
            }

            assert!(invoker.cancel());
            let rest: Vec<_> = stream.collect().await;
            assert_eq!(
                rest.last(),
                Some(&DownloadEvent::Failed("Download cancelled".to_string()))
            );
            assert!(!invoker.is_active());
            assert!(!invoker.cancel());
        }

        #[tokio::test]
        async fn test_non_utf8_output_is_drained() {
            let tool = FakeTool::new(
                "printf 'Destination: caf\\351.mp3\\n'\n\
                 i=0\n\
                 while [ $i -lt 200 ]; do echo \"[info] line $i\"; i=$((i+1)); done\n\
                 echo '[download] 100.0% of 3.00MiB'\n\
                 exit 0",
            );
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let events: Vec<_> = invoker
                .submit(VIDEO_URL, &settings_in(&out))
                .unwrap()
                .collect()
                .await;

            assert_eq!(
                terminal_events(&events),
                vec![&DownloadEvent::Completed(
                    "Download completed successfully".to_string()
                )]
            );
            assert!(events.contains(&DownloadEvent::Progress(1.0)));
        }

        #[tokio::test]
        async fn test_cancel_sends_terminate_signal() {
            let tool = FakeTool::new("");
            let marker = tool.dir.path().join("term.log");
            let script = format!(
                "#!/bin/sh\n\
                 trap 'echo term > \"{}\"; exit 143' TERM\n\
                 echo '[download]   1.0% of 3.00MiB'\n\
                 i=0\n\
                 while [ $i -lt 100 ]; do sleep 0.1; i=$((i+1)); done\n\
                 exit 0\n",
                marker.display()
            );
            std::fs::write(&tool.path, script).unwrap();
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let mut stream = invoker.submit(VIDEO_URL, &settings_in(&out)).unwrap();
            while let Some(event) = stream.next().await {
                if matches!(event, DownloadEvent::Progress(_)) {
                    break;
                }
            }

            assert!(invoker.cancel());
            let rest: Vec<_> = stream.collect().await;
            assert_eq!(
                rest.last(),
                Some(&DownloadEvent::Failed("Download cancelled".to_string()))
            );
            assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "term");
        }

        #[tokio::test]
        async fn test_dropping_unpolled_stream_frees_slot() {
            let tool = FakeTool::new("exit 0");
            let out = TempDir::new().unwrap();
            let invoker = tool.invoker();

            let stream = invoker.submit(VIDEO_URL, &settings_in(&out)).unwrap();
            assert!(invoker.is_active());
            drop(stream);
            assert!(!invoker.is_active());
            assert!(tool.calls().is_empty());
        }
    }
}
