use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use iced::{event, window, Event, Size, Subscription, Task, Theme};

use crate::api::{ApiConfig, ReleaseClient};
use crate::application::{DownloadEvent, DownloadInvoker};
use crate::config::{self, ConfigStore, Settings};
use crate::domain::{AppError, ToolResolution, UpdaterState};
use crate::tool::{ToolLocator, ToolUpdater, UpdaterConfig};
use crate::ui::{toolkit, DownloadMessage, DownloadView, Toolkit};

/// The busy indicator is dismissed after this long even if the updater is
/// still running.
const UPDATE_INDICATOR_CEILING: Duration = Duration::from_secs(45);

pub struct DownloadApp {
    view: DownloadView,
    config: ConfigStore,
    invoker: DownloadInvoker,
    toolkit: Box<dyn Toolkit>,
    updater_runs: u64,
    window_size: Option<Size>,
}

impl DownloadApp {
    pub fn new() -> (Self, Task<Message>) {
        let config = ConfigStore::open_default();
        log::info!("Loaded settings from {:?}", config.path());

        let mut app = Self {
            view: DownloadView::from_settings(config.settings()),
            toolkit: toolkit::select(config.settings()),
            invoker: DownloadInvoker::default(),
            config,
            updater_runs: 0,
            window_size: None,
        };
        let task = app.start_tool_check();
        (app, task)
    }

    fn start_tool_check(&mut self) -> Task<Message> {
        if !self.view.can_check_updates() {
            return Task::none();
        }
        self.view.tool_check_running = true;
        self.updater_runs += 1;
        self.view.is_checking_tool = true;

        let run = self.updater_runs;
        let updater = build_updater(self.config.settings());

        // The updater runs on the executor; the UI only waits for messages.
        Task::batch([
            Task::perform(async move { updater.resolve().await }, Message::ToolResolved),
            Task::perform(tokio::time::sleep(UPDATE_INDICATOR_CEILING), move |_| {
                Message::UpdateIndicatorExpired(run)
            }),
        ])
    }

    fn persist<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        if let Err(e) = self.config.update(f) {
            log::error!("Failed to save settings: {}", e);
            self.view.status_message = format!("Failed to save settings: {}", e);
        }
    }

    fn report(&mut self, ok: bool, message: &str) {
        let prefix = if ok {
            self.toolkit.success_prefix()
        } else {
            self.toolkit.failure_prefix()
        };
        self.view.status_message = format!("{} {}", prefix, message);
    }
}

fn build_updater(settings: &Settings) -> ToolUpdater {
    let managed_dir = config::managed_bin_dir();
    ToolUpdater::new(
        UpdaterConfig::from_settings(settings, managed_dir.clone()),
        ToolLocator::system(&managed_dir),
        ReleaseClient::new(ApiConfig::default()),
    )
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    ToolResolved(ToolResolution),
    /// Carries the updater run it belongs to
    UpdateIndicatorExpired(u64),
    OutputDirSelected(Option<PathBuf>),
    Download(DownloadEvent),
    WindowResized(Size),
    CloseRequested(window::Id),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(&ui_msg);

            match ui_msg {
                DownloadMessage::DownloadPressed => {
                    match app.invoker.submit(&app.view.youtube_url, app.config.settings()) {
                        Ok(stream) => {
                            app.view.is_downloading = true;
                            app.view.download_progress = 0.0;
                            app.view.progress_label.clear();
                            return Task::stream(stream.map(Message::Download));
                        }
                        Err(e) => {
                            if let AppError::Unavailable(_) = e {
                                log::warn!("Download requested without a usable yt-dlp");
                            }
                            app.report(false, &e.to_string());
                        }
                    }
                }
                DownloadMessage::CancelPressed => {
                    if app.invoker.cancel() {
                        app.view.status_message = "Cancelling download...".to_string();
                    } else {
                        app.view.status_message = "No download in progress".to_string();
                    }
                }
                DownloadMessage::BitrateSelected(bitrate) => {
                    app.persist(|s| s.mp3_bitrate = bitrate);
                    app.view.status_message = format!("Bitrate set to {}", bitrate);
                }
                DownloadMessage::ChannelSelected(channel) => {
                    app.persist(|s| s.ytdlp_update_channel = channel);
                    app.view.status_message =
                        format!("Update channel set to {}, used on the next check", channel);
                }
                DownloadMessage::AutoUpdateToggled => {
                    let enabled = app.view.auto_update;
                    app.persist(|s| s.ytdlp_auto_update = enabled);
                }
                DownloadMessage::BrowsePressed => {
                    let current = app.config.settings().output_directory.clone();
                    return Task::perform(
                        async move {
                            rfd::AsyncFileDialog::new()
                                .set_title("Choose output folder")
                                .set_directory(&current)
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::OutputDirSelected,
                    );
                }
                DownloadMessage::CheckUpdatesPressed => {
                    return app.start_tool_check();
                }
                DownloadMessage::UrlChanged(_) => {}
            }
        }
        Message::ToolResolved(resolution) => {
            app.view.tool_check_running = false;
            app.view.is_checking_tool = false;
            app.view.tool_summary = resolution.summary();
            log::info!(
                "yt-dlp resolution: {:?} at {:?}",
                resolution.state,
                resolution.binary.as_ref().map(|b| &b.path)
            );

            if resolution.state == UpdaterState::Unresolved {
                let hint = resolution.detail.clone().unwrap_or_default();
                app.report(false, &AppError::Unavailable(hint).to_string());
            }
            app.invoker.set_tool(resolution.binary);
        }
        Message::UpdateIndicatorExpired(run) => {
            if run == app.updater_runs && app.view.is_checking_tool {
                log::warn!("yt-dlp check still running after {:?}", UPDATE_INDICATOR_CEILING);
                app.view.is_checking_tool = false;
            }
        }
        Message::OutputDirSelected(Some(path)) => {
            app.view.output_directory = path.display().to_string();
            app.view.status_message = format!("Output folder set to {}", path.display());
            app.persist(|s| s.output_directory = path);
        }
        Message::OutputDirSelected(None) => {}
        Message::Download(event) => match event {
            DownloadEvent::Status(status) => {
                app.view.progress_label = status.clone();
                app.view.status_message = status;
            }
            DownloadEvent::Progress(progress) => {
                app.view.download_progress = progress;
                app.view.progress_label = format!("Downloading: {:.1}%", progress * 100.0);
            }
            DownloadEvent::Completed(message) => {
                app.view.is_downloading = false;
                app.view.download_progress = 1.0;
                app.view.progress_label = "Done".to_string();
                app.report(true, &message);
            }
            DownloadEvent::Failed(message) => {
                app.view.is_downloading = false;
                app.view.download_progress = 0.0;
                app.view.progress_label = "Failed".to_string();
                app.report(false, &message);
            }
        },
        Message::WindowResized(size) => {
            app.window_size = Some(size);
        }
        Message::CloseRequested(id) => {
            if let Some(size) = app.window_size {
                let geometry = format!("{}x{}", size.width.round() as u32, size.height.round() as u32);
                app.persist(|s| s.window_geometry = geometry);
            }
            if app.invoker.cancel() {
                log::info!("Cancelled active download on exit");
            }
            return window::close(id);
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view(app.toolkit.as_ref()).map(Message::UiMessage)
}

pub fn theme(app: &DownloadApp) -> Theme {
    app.toolkit.theme()
}

pub fn subscription(_app: &DownloadApp) -> Subscription<Message> {
    event::listen_with(|event, _status, id| match event {
        Event::Window(window::Event::Resized(size)) => Some(Message::WindowResized(size)),
        Event::Window(window::Event::CloseRequested) => Some(Message::CloseRequested(id)),
        _ => None,
    })
}
