pub mod toolkit;

use iced::{
    widget::{button, column, pick_list, progress_bar, row, text, text_input, Space},
    Element, Length,
};

use crate::config::Settings;
use crate::domain::{Bitrate, UpdateChannel};

pub use toolkit::Toolkit;

/// Main view state
pub struct DownloadView {
    pub youtube_url: String,
    pub status_message: String,
    pub progress_label: String,
    pub download_progress: f32,
    pub is_downloading: bool,
    /// Busy indicator; dismissed early when the check runs long.
    pub is_checking_tool: bool,
    pub tool_check_running: bool,
    pub tool_summary: String,
    pub bitrate: Bitrate,
    pub channel: UpdateChannel,
    pub auto_update: bool,
    pub output_directory: String,
}

impl DownloadView {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            youtube_url: String::new(),
            status_message: "Ready. Enter a YouTube URL to start.".to_string(),
            progress_label: String::new(),
            download_progress: 0.0,
            is_downloading: false,
            is_checking_tool: false,
            tool_check_running: false,
            tool_summary: String::new(),
            bitrate: settings.mp3_bitrate,
            channel: settings.ytdlp_update_channel,
            auto_update: settings.ytdlp_auto_update,
            output_directory: settings.output_directory.display().to_string(),
        }
    }

    pub fn can_check_updates(&self) -> bool {
        !self.tool_check_running
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    DownloadPressed,
    CancelPressed,
    BitrateSelected(Bitrate),
    ChannelSelected(UpdateChannel),
    AutoUpdateToggled,
    BrowsePressed,
    CheckUpdatesPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: &DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.youtube_url = url.clone();
            }
            DownloadMessage::BitrateSelected(bitrate) => {
                self.bitrate = *bitrate;
            }
            DownloadMessage::ChannelSelected(channel) => {
                self.channel = *channel;
            }
            DownloadMessage::AutoUpdateToggled => {
                self.auto_update = !self.auto_update;
            }
            // Handled by the app
            DownloadMessage::DownloadPressed
            | DownloadMessage::CancelPressed
            | DownloadMessage::BrowsePressed
            | DownloadMessage::CheckUpdatesPressed => {}
        }
    }

    pub fn view<'a>(&'a self, toolkit: &dyn Toolkit) -> Element<'a, DownloadMessage> {
        let body = toolkit.body_size();

        let download_button = button(if self.is_downloading {
            "Downloading..."
        } else {
            "Download MP3"
        })
        .on_press_maybe((!self.is_downloading).then_some(DownloadMessage::DownloadPressed))
        .padding([10, 20]);

        let cancel_button = button("Cancel")
            .on_press_maybe(self.is_downloading.then_some(DownloadMessage::CancelPressed))
            .padding([10, 20]);

        let settings_row = row![
            text("MP3 bitrate:").size(body),
            pick_list(
                Bitrate::ALL,
                Some(self.bitrate),
                DownloadMessage::BitrateSelected
            ),
            Space::new().width(Length::Fixed(20.0)),
            text("Update channel:").size(body),
            pick_list(
                UpdateChannel::ALL,
                Some(self.channel),
                DownloadMessage::ChannelSelected
            ),
            button(if self.auto_update {
                "Auto-update: on"
            } else {
                "Auto-update: off"
            })
            .on_press(DownloadMessage::AutoUpdateToggled),
        ]
        .spacing(toolkit.spacing());

        let output_row = row![
            text("Output folder:").size(body),
            text(&self.output_directory).size(body),
            button("Browse...").on_press(DownloadMessage::BrowsePressed),
        ]
        .spacing(toolkit.spacing());

        let tool_status = if self.is_checking_tool {
            text(toolkit.busy_label()).size(body)
        } else if self.tool_check_running {
            text("yt-dlp check still running in the background").size(body)
        } else {
            text(&self.tool_summary).size(body)
        };

        let tool_row = row![
            tool_status,
            button("Check for updates").on_press_maybe(
                self.can_check_updates()
                    .then_some(DownloadMessage::CheckUpdatesPressed)
            ),
        ]
        .spacing(toolkit.spacing());

        column![
            text("YouTube MP3 Downloader").size(toolkit.heading_size()),
            Space::new().height(Length::Fixed(20.0)),
            text("YouTube URL:").size(16),
            text_input("Paste a YouTube video link...", &self.youtube_url)
                .on_input(DownloadMessage::UrlChanged)
                .on_submit(DownloadMessage::DownloadPressed)
                .padding(10),
            row![download_button, cancel_button].spacing(toolkit.spacing()),
            Space::new().height(Length::Fixed(10.0)),
            settings_row,
            output_row,
            Space::new().height(Length::Fixed(10.0)),
            text(&self.status_message).size(body),
            progress_bar(0.0..=1.0, self.download_progress),
            text(&self.progress_label).size(body - 2.0),
            tool_row,
        ]
        .padding(20)
        .spacing(toolkit.spacing())
        .into()
    }
}
