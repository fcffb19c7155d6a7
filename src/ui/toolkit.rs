use iced::Theme;

use crate::config::{Settings, ThemePreference};

/// Set to any value to start with the plain look (no custom theme).
pub const PLAIN_UI_ENV: &str = "YT2D_PLAIN_UI";

/// Visual capabilities the view depends on. One implementation is picked at
/// startup and never swapped.
pub trait Toolkit: Send + Sync {
    fn name(&self) -> &'static str;
    fn theme(&self) -> Theme;
    fn heading_size(&self) -> f32;
    fn body_size(&self) -> f32;
    fn spacing(&self) -> f32;
    fn busy_label(&self) -> &'static str;
    fn success_prefix(&self) -> &'static str;
    fn failure_prefix(&self) -> &'static str;
}

pub struct StyledToolkit {
    theme: Theme,
}

impl StyledToolkit {
    pub fn new(preference: ThemePreference) -> Self {
        let theme = match preference {
            ThemePreference::Dark => Theme::Dark,
            ThemePreference::Light => Theme::Light,
        };
        Self { theme }
    }
}

impl Toolkit for StyledToolkit {
    fn name(&self) -> &'static str {
        "styled"
    }

    fn theme(&self) -> Theme {
        self.theme.clone()
    }

    fn heading_size(&self) -> f32 {
        28.0
    }

    fn body_size(&self) -> f32 {
        14.0
    }

    fn spacing(&self) -> f32 {
        12.0
    }

    fn busy_label(&self) -> &'static str {
        "⏳ Checking yt-dlp..."
    }

    fn success_prefix(&self) -> &'static str {
        "✅"
    }

    fn failure_prefix(&self) -> &'static str {
        "❌"
    }
}

/// Light theme regardless of settings, ASCII status markers.
pub struct PlainToolkit;

impl Toolkit for PlainToolkit {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }

    fn heading_size(&self) -> f32 {
        22.0
    }

    fn body_size(&self) -> f32 {
        14.0
    }

    fn spacing(&self) -> f32 {
        8.0
    }

    fn busy_label(&self) -> &'static str {
        "Checking yt-dlp..."
    }

    fn success_prefix(&self) -> &'static str {
        "[ok]"
    }

    fn failure_prefix(&self) -> &'static str {
        "[error]"
    }
}

pub fn select(settings: &Settings) -> Box<dyn Toolkit> {
    select_with(settings, std::env::var_os(PLAIN_UI_ENV).is_some())
}

fn select_with(settings: &Settings, plain: bool) -> Box<dyn Toolkit> {
    let toolkit: Box<dyn Toolkit> = if plain {
        Box::new(PlainToolkit)
    } else {
        Box::new(StyledToolkit::new(settings.theme))
    };
    log::info!("Using {} UI toolkit", toolkit.name());
    toolkit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_follows_theme_preference() {
        let settings = Settings {
            theme: ThemePreference::Light,
            ..Settings::default()
        };
        let toolkit = select_with(&settings, false);
        assert_eq!(toolkit.name(), "styled");
        assert!(matches!(toolkit.theme(), Theme::Light));
    }

    #[test]
    fn test_plain_toolkit_selected_on_request() {
        let toolkit = select_with(&Settings::default(), true);
        assert_eq!(toolkit.name(), "plain");
        assert_eq!(toolkit.failure_prefix(), "[error]");
        assert!(matches!(toolkit.theme(), Theme::Light));
    }
}
