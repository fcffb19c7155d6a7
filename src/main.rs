mod api;
mod app;
mod application;
mod config;
mod domain;
mod tool;
mod ui;
mod utils;

use iced::{window, Size};

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting YT MP3 Downloader");

    let (width, height) = config::ConfigStore::open_default()
        .settings()
        .window_size()
        .unwrap_or((800.0, 600.0));

    iced::application(app::DownloadApp::new, app::update, app::view)
        .title("YouTube MP3 Downloader")
        .subscription(app::subscription)
        .theme(app::theme)
        .window(window::Settings {
            size: Size::new(width.max(600.0), height.max(400.0)),
            min_size: Some(Size::new(600.0, 400.0)),
            exit_on_close_request: false,
            ..Default::default()
        })
        .run()
}
